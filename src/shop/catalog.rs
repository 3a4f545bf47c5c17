use crate::state::{Profile, DEFAULT_PIN};

/// A purchasable map pin skin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinStyle {
    pub id: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    /// Price in RSM
    pub price: u64,
    /// CSS colors the map surface draws the pin ring with
    pub border_color: &'static str,
    pub glow_color: &'static str,
    pub limited_edition: bool,
}

pub const PIN_CATALOG: [PinStyle; 5] = [
    PinStyle {
        id: DEFAULT_PIN,
        display_name: "Basic",
        description: "Clean and simple.",
        price: 0,
        border_color: "#3f3f46",
        glow_color: "transparent",
        limited_edition: false,
    },
    PinStyle {
        id: "neon_pink",
        display_name: "Neon Pink",
        description: "Glow like a rave.",
        price: 500,
        border_color: "#ec4899",
        glow_color: "#ec4899",
        limited_edition: false,
    },
    PinStyle {
        id: "golden",
        display_name: "Golden VIP",
        description: "For the real ballers.",
        price: 2000,
        border_color: "#eab308",
        glow_color: "#fbbf24",
        limited_edition: false,
    },
    PinStyle {
        id: "coachella",
        display_name: "Festival Vibes",
        description: "Limited Edition 2025",
        price: 1500,
        border_color: "#14b8a6",
        glow_color: "#2dd4bf",
        limited_edition: true,
    },
    PinStyle {
        id: "cyber",
        display_name: "Cyberpunk",
        description: "Glitch in the matrix.",
        price: 800,
        border_color: "#8b5cf6",
        glow_color: "#a78bfa",
        limited_edition: false,
    },
];

pub fn find(style_id: &str) -> Option<&'static PinStyle> {
    PIN_CATALOG.iter().find(|style| style.id == style_id)
}

/// Style to draw for an id coming off the wire. Unknown ids fall back to the basic pin.
pub fn style_or_default(style_id: &str) -> &'static PinStyle {
    find(style_id).unwrap_or(&PIN_CATALOG[0])
}

/// What the shop button for a style should offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Equipped,
    Owned,
    Affordable,
    TooExpensive,
}

impl Availability {
    /// Can the user act on this style at all?
    pub fn is_actionable(&self) -> bool {
        matches!(self, Self::Owned | Self::Affordable)
    }
}

/// Catalog in display order with what this profile can do with each entry.
pub fn shop_listing(profile: &Profile) -> Vec<(&'static PinStyle, Availability)> {
    let wardrobe = &profile.wardrobe;
    PIN_CATALOG
        .iter()
        .map(|style| {
            let availability = if wardrobe.is_equipped(style.id) {
                Availability::Equipped
            } else if wardrobe.owns(style.id) {
                Availability::Owned
            } else if wardrobe.balance >= style.price {
                Availability::Affordable
            } else {
                Availability::TooExpensive
            };
            (style, availability)
        })
        .collect()
}
