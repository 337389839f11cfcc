//! The encoding preference set advertised with SetEncodings.

use crate::config::EncodingsConfig;
use rfb_protocol::messages::types::{
    Encoding, PSEUDO_ENCODING_COMPRESS_LEVEL_0, PSEUDO_ENCODING_DESKTOP_SIZE,
    PSEUDO_ENCODING_LAST_RECT, PSEUDO_ENCODING_POINTER_POS, PSEUDO_ENCODING_QUALITY_LEVEL_0,
    PSEUDO_ENCODING_RICH_CURSOR, PSEUDO_ENCODING_X_CURSOR,
};

/// Inputs to the preference set. Changed by commands during a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EncodingPreferences {
    pub preferred: Encoding,
    pub copy_rect: bool,
    pub compress_level: Option<u8>,
    pub quality_level: Option<u8>,
    pub cursor_updates: bool,
}

impl From<&EncodingsConfig> for EncodingPreferences {
    fn from(config: &EncodingsConfig) -> Self {
        Self {
            preferred: config.preferred,
            copy_rect: config.copy_rect,
            compress_level: config.compress_level,
            quality_level: config.quality_level,
            cursor_updates: config.cursor_updates,
        }
    }
}

impl EncodingPreferences {
    /// Encoding ids in the order the server should prefer them.
    pub fn build(&self) -> Vec<i32> {
        let mut ids = Vec::with_capacity(16);
        ids.push(self.preferred.id());
        if self.copy_rect {
            ids.push(Encoding::CopyRect.id());
        }
        ids.extend(
            Encoding::FALLBACK_ORDER
                .iter()
                .filter(|&&e| e != self.preferred)
                .map(|e| e.id()),
        );
        if let Some(level) = self.compress_level {
            ids.push(PSEUDO_ENCODING_COMPRESS_LEVEL_0 + i32::from(level));
        }
        if let Some(level) = self.quality_level {
            ids.push(PSEUDO_ENCODING_QUALITY_LEVEL_0 + i32::from(level));
        }
        if self.cursor_updates {
            ids.extend([
                PSEUDO_ENCODING_RICH_CURSOR,
                PSEUDO_ENCODING_X_CURSOR,
                PSEUDO_ENCODING_POINTER_POS,
            ]);
        }
        ids.extend([PSEUDO_ENCODING_LAST_RECT, PSEUDO_ENCODING_DESKTOP_SIZE]);
        ids
    }
}

/// Remembers the last list sent so an unchanged set is not re-sent.
#[derive(Debug, Default)]
pub(crate) struct EncodingNegotiator {
    last_sent: Option<Vec<i32>>,
}

impl EncodingNegotiator {
    /// The list to send, or `None` when it equals the last one sent.
    pub fn next(&mut self, prefs: &EncodingPreferences) -> Option<Vec<i32>> {
        let ids = prefs.build();
        if self.last_sent.as_ref() == Some(&ids) {
            return None;
        }
        self.last_sent = Some(ids.clone());
        Some(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs() -> EncodingPreferences {
        EncodingPreferences::from(&EncodingsConfig::default())
    }

    #[test]
    fn test_default_order() {
        assert_eq!(prefs().build(), vec![16, 5, 6, 4, 2, 0, -224, -223]);
    }

    #[test]
    fn test_preferred_moves_to_front() {
        let mut p = prefs();
        p.preferred = Encoding::Hextile;
        p.copy_rect = true;
        assert_eq!(p.build(), vec![5, 1, 16, 6, 4, 2, 0, -224, -223]);
    }

    #[test]
    fn test_levels_and_cursor() {
        let mut p = prefs();
        p.preferred = Encoding::Raw;
        p.compress_level = Some(6);
        p.quality_level = Some(0);
        p.cursor_updates = true;
        assert_eq!(
            p.build(),
            vec![0, 16, 5, 6, 4, 2, -250, -32, -239, -240, -232, -224, -223]
        );
    }

    #[test]
    fn test_unchanged_set_sent_once() {
        let mut negotiator = EncodingNegotiator::default();
        let mut p = prefs();
        assert!(negotiator.next(&p).is_some());
        assert!(negotiator.next(&p).is_none());
        assert!(negotiator.next(&p).is_none());

        p.preferred = Encoding::Zlib;
        assert_eq!(negotiator.next(&p).unwrap()[0], 6);
        assert!(negotiator.next(&p).is_none());
    }
}
