//! Operator names: dot-separated components such as `nn.relu` or `concatenate`.
use crate::error::Error;
use std::fmt;
use std::slice;
use std::str::FromStr;

#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Path(Vec<PathComponent>);

#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct PathComponent(String); // only [a-zA-Z0-9_]

pub fn path(components: Vec<&str>) -> Result<Path, Error> {
    components.try_into()
}

pub fn is_valid_component(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Path {
    pub fn iter(&self) -> slice::Iter<'_, PathComponent> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The namespace of an operator, e.g. `nn` for `nn.relu`
    pub fn namespace(&self) -> Option<Path> {
        match self.0.len() {
            0 | 1 => None,
            n => Some(Path(self.0[..n - 1].to_vec())),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Display/TryFrom instances

impl TryFrom<String> for PathComponent {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_valid_component(&value) {
            Ok(PathComponent(value))
        } else {
            Err(Error::InvalidPath(value))
        }
    }
}

impl TryFrom<Vec<&str>> for Path {
    type Error = Error;

    fn try_from(value: Vec<&str>) -> Result<Self, Self::Error> {
        let components: Result<Vec<PathComponent>, Error> = value
            .into_iter()
            .map(|s| s.to_string().try_into())
            .collect();
        let components = components?;
        if components.is_empty() {
            return Err(Error::InvalidPath(String::new()));
        }
        Ok(Path(components))
    }
}

impl FromStr for Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split('.')
            .collect::<Vec<_>>()
            .try_into()
            .map_err(|_| Error::InvalidPath(s.to_string()))
    }
}

impl fmt::Display for PathComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let components: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", components.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_display() {
        let p: Path = "nn.relu".parse().unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(p.to_string(), "nn.relu");
        assert_eq!(p.namespace(), Some("nn".parse().unwrap()));
        assert_eq!(path(vec!["add"]).unwrap().namespace(), None);
    }

    #[test]
    fn test_invalid() {
        assert!("nn..relu".parse::<Path>().is_err());
        assert!("".parse::<Path>().is_err());
        assert!("nn.re-lu".parse::<Path>().is_err());
    }
}
