// src/bot/payments.rs - Premium purchases and paid identity reveals

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::bot::matchmaking::MatchEngine;
use crate::config::{PaymentSettings, PremiumPlan};
use crate::store::UserStore;
use crate::types::{Invoice, PaymentCheck, PaymentProduct, RevealOutcome, UserId, UserProfile};

/// What a confirmed payment turned into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentResult {
    PremiumGranted { expires_at: DateTime<Utc> },
    Reveal(RevealOutcome),
}

pub struct PaymentService {
    engine: Arc<MatchEngine>,
    store: Arc<dyn UserStore>,
    settings: Arc<RwLock<PaymentSettings>>,
    /// Plans dropped by a reload, still honoured for payments already under way
    retired_plans: Arc<RwLock<HashMap<String, PremiumPlan>>>,
}

impl PaymentService {
    pub fn new(engine: Arc<MatchEngine>, store: Arc<dyn UserStore>, settings: PaymentSettings) -> Self {
        Self {
            engine,
            store,
            settings: Arc::new(RwLock::new(settings)),
            retired_plans: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn set_settings(&self, settings: PaymentSettings) {
        let mut current = self.settings.write().await;
        let mut retired = self.retired_plans.write().await;
        for plan in &current.premium_plans {
            if settings.plan(&plan.id).is_none() {
                info!("Premium plan '{}' retired", plan.id);
                retired.insert(plan.id.clone(), plan.clone());
            }
        }
        for plan in &settings.premium_plans {
            retired.remove(&plan.id);
        }
        *current = settings;
    }

    /// Current plan, or a retired one so confirmed charges still resolve
    async fn plan_for_charge(&self, plan_id: &str) -> Option<PremiumPlan> {
        if let Some(plan) = self.settings.read().await.plan(plan_id) {
            return Some(plan.clone());
        }
        self.retired_plans.read().await.get(plan_id).cloned()
    }

    pub async fn settings(&self) -> PaymentSettings {
        self.settings.read().await.clone()
    }

    pub async fn invoice_for(&self, product: &PaymentProduct) -> Result<Invoice> {
        let settings = self.settings.read().await;
        match product {
            PaymentProduct::Premium { plan_id } => {
                let plan = settings
                    .plan(plan_id)
                    .ok_or_else(|| anyhow!("Unknown premium plan '{}'", plan_id))?;
                Ok(Invoice {
                    title: plan.title.clone(),
                    description: format!(
                        "{} days of premium: choose your partner's gender, skip the queue, no automatic penalties",
                        plan.days
                    ),
                    payload: product.payload(),
                    currency: settings.currency.clone(),
                    amount: plan.price,
                })
            }
            PaymentProduct::IdentityReveal { .. } => Ok(Invoice {
                title: "Reveal identities".to_string(),
                description: "You and your partner both see each other's nickname".to_string(),
                payload: product.payload(),
                currency: settings.currency.clone(),
                amount: settings.reveal_price,
            }),
        }
    }

    /// Answer a pending payment before the user is charged
    pub async fn check_pre_checkout(
        &self,
        buyer: UserId,
        payload: &str,
        total_amount: i64,
    ) -> Result<PaymentCheck> {
        let Some(product) = PaymentProduct::parse(payload) else {
            warn!("Pre-checkout from {} with unknown payload '{}'", buyer, payload);
            return Ok(PaymentCheck::Reject("Unknown product".to_string()));
        };

        match self.store.get(buyer).await? {
            Some(profile) if profile.is_active => {}
            Some(_) => return Ok(PaymentCheck::Reject("Your account is banned".to_string())),
            None => return Ok(PaymentCheck::Reject("Please register first".to_string())),
        }

        let expected = match self.invoice_for(&product).await {
            Ok(invoice) => invoice.amount,
            Err(_) => return Ok(PaymentCheck::Reject("This plan is no longer offered".to_string())),
        };
        if expected != total_amount {
            warn!("Pre-checkout from {}: amount {} does not match price {}", buyer, total_amount, expected);
            return Ok(PaymentCheck::Reject("Price has changed, please try again".to_string()));
        }

        if let PaymentProduct::IdentityReveal { partner } = product {
            if self.engine.partner_of(buyer).await != Some(partner) {
                return Ok(PaymentCheck::Reject("This chat has already ended".to_string()));
            }
        }

        Ok(PaymentCheck::Accept)
    }

    /// Dispatch a completed payment to the matching handler
    pub async fn on_payment_confirmed(
        &self,
        buyer: UserId,
        payload: &str,
        total_amount: i64,
        now: DateTime<Utc>,
    ) -> Result<PaymentResult> {
        let product = PaymentProduct::parse(payload)
            .ok_or_else(|| anyhow!("Confirmed payment with unknown payload '{}'", payload))?;

        match product {
            PaymentProduct::Premium { plan_id } => {
                let plan = self
                    .plan_for_charge(&plan_id)
                    .await
                    .ok_or_else(|| anyhow!("Confirmed payment for unknown plan '{}'", plan_id))?;
                if plan.price != total_amount {
                    warn!(
                        "User {} was charged {} for plan '{}' priced at {}",
                        buyer, total_amount, plan_id, plan.price
                    );
                }
                let expires_at = self.on_premium_purchased(buyer, plan.days, total_amount, now).await?;
                Ok(PaymentResult::PremiumGranted { expires_at })
            }
            PaymentProduct::IdentityReveal { partner } => {
                let price = self.settings.read().await.reveal_price;
                if price != total_amount {
                    warn!("User {} was charged {} for a reveal priced at {}", buyer, total_amount, price);
                }
                let outcome = self.on_identity_reveal_purchased(buyer, partner).await?;
                Ok(PaymentResult::Reveal(outcome))
            }
        }
    }

    /// Extend premium by `days`, counting from the current expiry when it is still ahead
    pub async fn on_premium_purchased(
        &self,
        user: UserId,
        days: i64,
        amount_paid: i64,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let profile = self
            .store
            .update(
                user,
                Box::new(move |p: &mut UserProfile| {
                    let base = match p.premium_expires_at {
                        Some(expires) if p.is_premium && expires > now => expires,
                        _ => now,
                    };
                    p.is_premium = true;
                    p.premium_expires_at = Some(base + Duration::days(days));
                }),
            )
            .await?;

        let expires_at = profile
            .premium_expires_at
            .ok_or_else(|| anyhow!("Premium expiry missing after purchase by {}", user))?;
        info!("User {} bought {} day(s) of premium for {}, valid until {}", user, days, amount_paid, expires_at);
        Ok(expires_at)
    }

    /// Reveal nicknames, but only while the pair is still chatting
    pub async fn on_identity_reveal_purchased(&self, user: UserId, partner: UserId) -> Result<RevealOutcome> {
        if self.engine.partner_of(user).await != Some(partner) {
            warn!("Identity reveal by {} for stale partner {}", user, partner);
            return Ok(RevealOutcome::StaleSession);
        }

        let buyer = self.store.fetch(user).await?;
        let other = self.store.fetch(partner).await?;
        info!("Identities revealed between {} and {}", user, partner);
        Ok(RevealOutcome::Revealed {
            buyer_nickname: buyer.nickname,
            partner_nickname: other.nickname,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryUserStore;
    use crate::types::{Gender, GenderPreference};

    async fn service() -> (PaymentService, Arc<MatchEngine>, InMemoryUserStore) {
        let store = InMemoryUserStore::new();
        store.insert(UserProfile::new(UserId(1), "Alice", Gender::Female)).await.unwrap();
        store.insert(UserProfile::new(UserId(2), "Bob", Gender::Male)).await.unwrap();
        store.insert(UserProfile::new(UserId(3), "Carol", Gender::Female)).await.unwrap();

        let shared: Arc<dyn UserStore> = Arc::new(store.clone());
        let engine = Arc::new(MatchEngine::new(Arc::clone(&shared)));
        let service = PaymentService::new(Arc::clone(&engine), shared, PaymentSettings::default());
        (service, engine, store)
    }

    #[tokio::test]
    async fn test_premium_extends_from_current_expiry() {
        let (service, _, store) = service().await;
        let now = Utc::now();

        let first = service.on_premium_purchased(UserId(1), 7, 199, now).await.unwrap();
        assert_eq!(first, now + Duration::days(7));
        let second = service.on_premium_purchased(UserId(1), 30, 499, now).await.unwrap();
        assert_eq!(second, now + Duration::days(37));
        assert!(store.fetch(UserId(1)).await.unwrap().premium_active(now));
    }

    #[tokio::test]
    async fn test_lapsed_premium_restarts_from_now() {
        let (service, _, store) = service().await;
        let now = Utc::now();
        store
            .update(
                UserId(1),
                Box::new(move |p: &mut UserProfile| {
                    p.is_premium = true;
                    p.premium_expires_at = Some(now - Duration::days(2));
                }),
            )
            .await
            .unwrap();

        assert_eq!(service.on_premium_purchased(UserId(1), 7, 199, now).await.unwrap(), now + Duration::days(7));
    }

    #[tokio::test]
    async fn test_reveal_requires_live_session() {
        let (service, engine, _) = service().await;
        let now = Utc::now();
        engine.request_match(UserId(1), GenderPreference::Any, now).await.unwrap();
        engine.request_match(UserId(2), GenderPreference::Any, now).await.unwrap();

        assert_eq!(
            service.on_identity_reveal_purchased(UserId(1), UserId(2)).await.unwrap(),
            RevealOutcome::Revealed {
                buyer_nickname: "Alice".to_string(),
                partner_nickname: "Bob".to_string()
            }
        );

        engine.end_session(UserId(2)).await;
        engine.request_match(UserId(2), GenderPreference::Any, now).await.unwrap();
        engine.request_match(UserId(3), GenderPreference::Any, now).await.unwrap();
        assert_eq!(
            service.on_identity_reveal_purchased(UserId(1), UserId(2)).await.unwrap(),
            RevealOutcome::StaleSession
        );
    }

    #[tokio::test]
    async fn test_pre_checkout_validation() {
        let (service, engine, store) = service().await;
        let now = Utc::now();

        assert_eq!(service.check_pre_checkout(UserId(1), "premium:week", 199).await.unwrap(), PaymentCheck::Accept);
        assert!(matches!(service.check_pre_checkout(UserId(1), "premium:week", 1).await.unwrap(), PaymentCheck::Reject(_)));
        assert!(matches!(service.check_pre_checkout(UserId(1), "premium:decade", 199).await.unwrap(), PaymentCheck::Reject(_)));
        assert!(matches!(service.check_pre_checkout(UserId(1), "nonsense", 199).await.unwrap(), PaymentCheck::Reject(_)));
        assert!(matches!(service.check_pre_checkout(UserId(9), "premium:week", 199).await.unwrap(), PaymentCheck::Reject(_)));
        assert!(matches!(service.check_pre_checkout(UserId(1), "reveal:2", 99).await.unwrap(), PaymentCheck::Reject(_)));

        engine.request_match(UserId(1), GenderPreference::Any, now).await.unwrap();
        engine.request_match(UserId(2), GenderPreference::Any, now).await.unwrap();
        assert_eq!(service.check_pre_checkout(UserId(1), "reveal:2", 99).await.unwrap(), PaymentCheck::Accept);

        store
            .update(UserId(1), Box::new(|p: &mut UserProfile| p.is_active = false))
            .await
            .unwrap();
        assert!(matches!(service.check_pre_checkout(UserId(1), "premium:week", 199).await.unwrap(), PaymentCheck::Reject(_)));
    }

    #[tokio::test]
    async fn test_confirmed_payment_dispatch() {
        let (service, _, _) = service().await;
        let now = Utc::now();
        let result = service.on_payment_confirmed(UserId(3), "premium:month", 499, now).await.unwrap();
        assert_eq!(result, PaymentResult::PremiumGranted { expires_at: now + Duration::days(30) });
        assert!(service.on_payment_confirmed(UserId(3), "premium:unknown", 499, now).await.is_err());
    }

    #[tokio::test]
    async fn test_plan_removed_after_checkout_still_grants() {
        let (service, _, store) = service().await;
        let now = Utc::now();
        assert_eq!(service.check_pre_checkout(UserId(1), "premium:week", 199).await.unwrap(), PaymentCheck::Accept);

        let mut reloaded = PaymentSettings::default();
        reloaded.premium_plans.retain(|p| p.id != "week");
        service.set_settings(reloaded).await;
        assert!(matches!(service.check_pre_checkout(UserId(1), "premium:week", 199).await.unwrap(), PaymentCheck::Reject(_)));

        let result = service.on_payment_confirmed(UserId(1), "premium:week", 199, now).await.unwrap();
        assert_eq!(result, PaymentResult::PremiumGranted { expires_at: now + Duration::days(7) });
        assert!(store.fetch(UserId(1)).await.unwrap().premium_active(now));

        // Bringing the plan back takes it off the retired list
        service.set_settings(PaymentSettings::default()).await;
        assert!(service.retired_plans.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_mismatched_charge_is_still_honoured() {
        let (service, _, _) = service().await;
        let now = Utc::now();
        let result = service.on_payment_confirmed(UserId(2), "premium:week", 150, now).await.unwrap();
        assert_eq!(result, PaymentResult::PremiumGranted { expires_at: now + Duration::days(7) });
    }
}
