use tracing::info;

use super::PinStyle;
use crate::api::PresenceStore;
use crate::error::ShopError;
use crate::state::{UserId, Wardrobe};

/// What a successful shop action did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    /// Style was already owned, it is now equipped. No charge.
    Equipped,
    /// Style was bought and equipped. Carries the remaining balance.
    Purchased { balance: u64 },
}

/// Planned change to a wardrobe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchasePlan {
    Equip,
    Buy(Wardrobe),
}

/// Decide what buying or equipping `style` means for `wardrobe`.
pub fn plan_purchase(wardrobe: &Wardrobe, style: &PinStyle) -> Result<PurchasePlan, ShopError> {
    if wardrobe.owns(style.id) {
        return Ok(PurchasePlan::Equip);
    }

    if wardrobe.balance < style.price {
        return Err(ShopError::InsufficientFunds {
            balance: wardrobe.balance,
            price: style.price,
        });
    }

    let mut unlocked = wardrobe.unlocked.clone();
    unlocked.push(style.id.to_string());

    Ok(PurchasePlan::Buy(Wardrobe {
        balance: wardrobe.balance - style.price,
        unlocked,
        equipped: style.id.to_string(),
    }))
}

/// Buy `style` if needed, then equip it.
///
/// Reads the current wardrobe from the store and writes the result back
/// as one guarded update. If the balance moved in between nothing is
/// written and [`ShopError::Conflict`] comes back.
pub async fn purchase_or_equip<S: PresenceStore + ?Sized>(
    store: &S,
    user_id: &UserId,
    style: &PinStyle,
) -> Result<PurchaseOutcome, ShopError> {
    let profile = store.fetch_profile(user_id).await?;

    match plan_purchase(&profile.wardrobe, style)? {
        PurchasePlan::Equip => {
            store.set_equipped(user_id, style.id).await?;
            info!(user = %user_id, style = style.id, "equipped pin");
            Ok(PurchaseOutcome::Equipped)
        }
        PurchasePlan::Buy(next) => {
            let committed = store
                .commit_purchase(user_id, profile.wardrobe.balance, &next)
                .await?;
            if !committed {
                return Err(ShopError::Conflict);
            }
            info!(
                user = %user_id,
                style = style.id,
                price = style.price,
                balance = next.balance,
                "bought pin"
            );
            Ok(PurchaseOutcome::Purchased { balance: next.balance })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryStore;
    use crate::shop::catalog;
    use crate::state::Profile;

    fn wardrobe(balance: u64) -> Wardrobe {
        Wardrobe {
            balance,
            ..Default::default()
        }
    }

    fn style(id: &str) -> &'static PinStyle {
        catalog::find(id).unwrap()
    }

    #[test]
    fn test_plan_buy() {
        let plan = plan_purchase(&wardrobe(1200), style("neon_pink")).unwrap();

        let PurchasePlan::Buy(next) = plan else {
            panic!("Expected Buy plan");
        };
        assert_eq!(next.balance, 700);
        assert_eq!(next.unlocked, vec!["default", "neon_pink"]);
        assert_eq!(next.equipped, "neon_pink");
    }

    #[test]
    fn test_plan_exact_balance() {
        let plan = plan_purchase(&wardrobe(800), style("cyber")).unwrap();
        assert!(matches!(plan, PurchasePlan::Buy(ref w) if w.balance == 0));
    }

    #[test]
    fn test_plan_insufficient() {
        let err = plan_purchase(&wardrobe(100), style("golden")).unwrap_err();
        assert!(matches!(
            err,
            ShopError::InsufficientFunds { balance: 100, price: 2000 }
        ));
    }

    #[test]
    fn test_plan_owned_is_equip_even_when_broke() {
        let mut w = wardrobe(0);
        w.unlocked.push("golden".to_string());
        assert_eq!(plan_purchase(&w, style("golden")).unwrap(), PurchasePlan::Equip);
    }

    async fn store_with(balance: u64) -> (MemoryStore, UserId) {
        let id = UserId::new("me");
        let mut profile = Profile::new(id.clone(), "me");
        profile.wardrobe.balance = balance;
        let store = MemoryStore::new();
        store.insert_profile(profile).await;
        (store, id)
    }

    #[tokio::test]
    async fn test_purchase_deducts_and_equips() {
        let (store, id) = store_with(1200).await;

        let outcome = purchase_or_equip(&store, &id, style("neon_pink")).await.unwrap();
        assert_eq!(outcome, PurchaseOutcome::Purchased { balance: 700 });

        let profile = store.fetch_profile(&id).await.unwrap();
        assert_eq!(profile.wardrobe.balance, 700);
        assert!(profile.wardrobe.owns("neon_pink"));
        assert_eq!(profile.wardrobe.equipped, "neon_pink");
    }

    #[tokio::test]
    async fn test_equip_owned_keeps_balance() {
        let (store, id) = store_with(1200).await;
        purchase_or_equip(&store, &id, style("neon_pink")).await.unwrap();
        purchase_or_equip(&store, &id, style("default")).await.unwrap();

        let outcome = purchase_or_equip(&store, &id, style("neon_pink")).await.unwrap();
        assert_eq!(outcome, PurchaseOutcome::Equipped);

        let profile = store.fetch_profile(&id).await.unwrap();
        assert_eq!(profile.wardrobe.balance, 700);
        assert_eq!(profile.wardrobe.equipped, "neon_pink");
        assert_eq!(profile.wardrobe.unlocked.len(), 2);
    }

    #[tokio::test]
    async fn test_insufficient_funds_changes_nothing() {
        let (store, id) = store_with(300).await;

        let err = purchase_or_equip(&store, &id, style("cyber")).await.unwrap_err();
        assert!(matches!(err, ShopError::InsufficientFunds { .. }));

        let profile = store.fetch_profile(&id).await.unwrap();
        assert_eq!(profile.wardrobe, Wardrobe { balance: 300, ..Default::default() });
    }

    /// Spends 100 from another device right after every profile read.
    struct RacyStore(MemoryStore);

    #[async_trait::async_trait]
    impl PresenceStore for RacyStore {
        async fn update_location(
            &self,
            user_id: &UserId,
            point: crate::state::GeoPoint,
            at: chrono::DateTime<chrono::Utc>,
        ) -> Result<(), crate::error::StoreError> {
            self.0.update_location(user_id, point, at).await
        }

        async fn set_hidden(&self, user_id: &UserId, hidden: bool) -> Result<(), crate::error::StoreError> {
            self.0.set_hidden(user_id, hidden).await
        }

        async fn list_visible_users(
            &self,
            now: chrono::DateTime<chrono::Utc>,
        ) -> Result<Vec<crate::state::PresenceRecord>, crate::error::StoreError> {
            self.0.list_visible_users(now).await
        }

        async fn fetch_profile(&self, user_id: &UserId) -> Result<Profile, crate::error::StoreError> {
            let seen = self.0.fetch_profile(user_id).await?;
            let mut spent = seen.clone();
            spent.wardrobe.balance -= 100;
            self.0.insert_profile(spent).await;
            Ok(seen)
        }

        async fn set_equipped(&self, user_id: &UserId, style_id: &str) -> Result<(), crate::error::StoreError> {
            self.0.set_equipped(user_id, style_id).await
        }

        async fn commit_purchase(
            &self,
            user_id: &UserId,
            expected_balance: u64,
            next: &Wardrobe,
        ) -> Result<bool, crate::error::StoreError> {
            self.0.commit_purchase(user_id, expected_balance, next).await
        }
    }

    #[tokio::test]
    async fn test_balance_moved_is_conflict() {
        let (inner, id) = store_with(1200).await;
        let store = RacyStore(inner);

        let err = purchase_or_equip(&store, &id, style("neon_pink")).await.unwrap_err();
        assert!(matches!(err, ShopError::Conflict));

        // Only the other device's spend landed
        let profile = store.0.fetch_profile(&id).await.unwrap();
        assert_eq!(profile.wardrobe.balance, 1100);
        assert!(!profile.wardrobe.owns("neon_pink"));
    }

    #[tokio::test]
    async fn test_unknown_profile_is_store_error() {
        let store = MemoryStore::new();
        let err = purchase_or_equip(&store, &UserId::new("ghost"), style("cyber"))
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::Store(_)));
    }
}
