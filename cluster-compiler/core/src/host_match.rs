use std::{convert::Infallible, str::FromStr};

/// Matches hostnames exactly or by a `*.`-prefixed wildcard suffix.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum HostMatch {
    Any,
    Exact(String),
    Suffix { reverse_labels: Vec<String> },
}

// === impl HostMatch ===

impl HostMatch {
    pub fn matches(&self, host: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(h) => h.eq_ignore_ascii_case(host),
            Self::Suffix { reverse_labels } => {
                let mut labels = host.rsplit('.');
                for suffix in reverse_labels {
                    match labels.next() {
                        Some(l) if l.eq_ignore_ascii_case(suffix) => {}
                        _ => return false,
                    }
                }
                // The wildcard must stand for at least one label.
                labels.next().is_some()
            }
        }
    }

    /// Orders matches from least to most specific: any host, then wildcards by
    /// the number of labels they fix, then exact hosts.
    pub fn specificity(&self) -> usize {
        match self {
            Self::Any => 0,
            Self::Suffix { reverse_labels } => 1 + reverse_labels.len(),
            Self::Exact(_) => usize::MAX,
        }
    }
}

impl FromStr for HostMatch {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            return Ok(Self::Any);
        }
        if let Some(suffix) = s.strip_prefix("*.") {
            return Ok(Self::Suffix {
                reverse_labels: suffix.rsplit('.').map(str::to_ascii_lowercase).collect(),
            });
        }
        Ok(Self::Exact(s.to_ascii_lowercase()))
    }
}
