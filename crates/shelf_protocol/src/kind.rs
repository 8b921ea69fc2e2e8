//! Content stream kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// MIME type whose records carry a meaningful source stream.
pub const SOURCE_CONTENT_TYPE: &str = "application/epub+zip";

/// The two content streams a record can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// The reading-optimized document served to the reader.
    Primary,
    /// The original document payload.
    Source,
}

impl ContentKind {
    /// All stream kinds, in fetch-priority order.
    pub const ALL: [ContentKind; 2] = [ContentKind::Primary, ContentKind::Source];

    /// Wire path segment for this stream.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Primary => "content",
            ContentKind::Source => "source",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content" | "primary" => Ok(ContentKind::Primary),
            "source" => Ok(ContentKind::Source),
            other => Err(format!("unknown content kind: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_segments() {
        assert_eq!(ContentKind::Primary.as_str(), "content");
        assert_eq!(ContentKind::Source.as_str(), "source");
    }

    #[test]
    fn parse_accepts_wire_and_friendly_names() {
        assert_eq!("content".parse::<ContentKind>().unwrap(), ContentKind::Primary);
        assert_eq!("primary".parse::<ContentKind>().unwrap(), ContentKind::Primary);
        assert_eq!("source".parse::<ContentKind>().unwrap(), ContentKind::Source);
        assert!("audio".parse::<ContentKind>().is_err());
    }
}
