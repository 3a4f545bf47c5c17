use super::UserId;

/// Style every account owns from the start.
pub const DEFAULT_PIN: &str = "default";

/// Cosmetics and currency attached to a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wardrobe {
    /// RSM balance
    pub balance: u64,
    /// Style ids the user has paid for (always includes the default)
    pub unlocked: Vec<String>,
    /// Style id currently shown on the user's pin
    pub equipped: String,
}

impl Default for Wardrobe {
    fn default() -> Self {
        Self {
            balance: 0,
            unlocked: vec![DEFAULT_PIN.to_string()],
            equipped: DEFAULT_PIN.to_string(),
        }
    }
}

impl Wardrobe {
    pub fn owns(&self, style_id: &str) -> bool {
        self.unlocked.iter().any(|id| id == style_id)
    }

    pub fn is_equipped(&self, style_id: &str) -> bool {
        self.equipped == style_id
    }
}

/// The signed-in user's own profile, as far as the map cares.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub id: UserId,
    pub username: String,
    pub avatar_url: String,
    /// Ghost mode: nothing is published and nobody sees us
    pub is_hidden: bool,
    pub is_verified: bool,
    pub wardrobe: Wardrobe,
}

impl Profile {
    /// Fresh profile with the store's defaults (hidden until the user goes live).
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        let avatar_url = format!("https://picsum.photos/seed/{}/100", id);
        Self {
            id,
            username: username.into(),
            avatar_url,
            is_hidden: true,
            is_verified: false,
            wardrobe: Wardrobe::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_wardrobe() {
        let w = Wardrobe::default();
        assert!(w.owns(DEFAULT_PIN));
        assert!(w.is_equipped(DEFAULT_PIN));
        assert!(!w.owns("golden"));
        assert_eq!(w.balance, 0);
    }

    #[test]
    fn test_new_profile_starts_hidden() {
        let p = Profile::new(UserId::new("u1"), "alice");
        assert!(p.is_hidden);
        assert_eq!(p.avatar_url, "https://picsum.photos/seed/u1/100");
    }
}
