use serde::Serialize;

pub const MOVIES_READ: &str = "movies:read";
pub const MOVIES_WRITE: &str = "movies:write";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Permissions(pub Vec<String>);

impl Permissions {
    pub fn include(&self, code: &str) -> bool {
        self.0.iter().any(|p| p == code)
    }
}

impl FromIterator<String> for Permissions {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Permissions(iter.into_iter().collect())
    }
}
