use crate::zone::ZoneName;
use crate::zone::name::normalize_name;

/// Which query names may be passed to the next handler on a miss
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FallthroughPolicy {
    #[default]
    Disabled,
    All,
    Zones(Vec<ZoneName>),
}

impl FallthroughPolicy {
    /// Build from a configured list: empty disables, `*` or `.` covers everything
    pub fn from_list<S: AsRef<str>>(entries: &[S]) -> Result<Self, crate::zone::ZoneError> {
        if entries.is_empty() {
            return Ok(Self::Disabled);
        }
        if entries
            .iter()
            .any(|e| matches!(e.as_ref().trim(), "*" | "."))
        {
            return Ok(Self::All);
        }
        let zones = entries
            .iter()
            .map(|e| ZoneName::new(e.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::Zones(zones))
    }

    pub fn covers(&self, qname: &str) -> bool {
        match self {
            Self::Disabled => false,
            Self::All => true,
            Self::Zones(zones) => {
                let qname = normalize_name(qname);
                zones.iter().any(|zone| zone.contains(&qname))
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_forms() {
        let empty: [&str; 0] = [];
        assert!(!FallthroughPolicy::from_list(&empty).unwrap().covers("a.example.com."));
        assert!(FallthroughPolicy::from_list(&["*"]).unwrap().covers("anything.org."));
        assert!(FallthroughPolicy::from_list(&["."]).unwrap().is_enabled());

        let policy = FallthroughPolicy::from_list(&["sub.example.com"]).unwrap();
        assert!(policy.covers("x.SUB.example.com"));
        assert!(!policy.covers("www.example.com."));
        assert!(FallthroughPolicy::from_list(&["bad..name"]).is_err());
    }
}
