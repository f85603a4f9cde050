use std::fmt;

/// Importance tier assigned to a tracked item by its WikiProject banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Importance {
    Top,
    High,
    Mid,
    Low,
    Unknown,
}

impl Importance {
    /// The tiers that get their own result bucket; `Unknown` rows stay in the
    /// table but are never queried.
    pub const QUERIED: [Self; 4] = [Self::Top, Self::High, Self::Mid, Self::Low];

    pub const fn as_str(&self) -> &str {
        match self {
            Self::Top => "top",
            Self::High => "high",
            Self::Mid => "mid",
            Self::Low => "low",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a banner tag value. Anything unrecognized maps to `Unknown`,
    /// which also covers snippets where no tag was matched at all.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "top" => Self::Top,
            "high" => Self::High,
            "mid" => Self::Mid,
            "low" => Self::Low,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_tag() {
        assert_eq!(Importance::from_tag("top"), Importance::Top);
        assert_eq!(Importance::from_tag("High"), Importance::High);
        assert_eq!(Importance::from_tag(" mid "), Importance::Mid);
        assert_eq!(Importance::from_tag("low"), Importance::Low);
        assert_eq!(Importance::from_tag("NA"), Importance::Unknown);
        assert_eq!(Importance::from_tag(""), Importance::Unknown);
    }

    #[test]
    fn test_round_trip() {
        for tier in Importance::QUERIED {
            assert_eq!(Importance::from_tag(tier.as_str()), tier);
        }
    }

    #[test]
    fn test_queried_excludes_unknown() {
        assert!(!Importance::QUERIED.contains(&Importance::Unknown));
    }
}
