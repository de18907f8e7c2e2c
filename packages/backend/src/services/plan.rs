use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tutorly_algo::DAY_MS;

use crate::config::PlanLimits;
use crate::db::operations::usage;
use crate::db::operations::users::{self, UserRow};
use crate::time::{day_key, format_timestamp_ms_iso_millis};

/// How long a past-due paid plan keeps its features after the period ends.
pub const PAST_DUE_GRACE_MS: i64 = 3 * DAY_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Premium,
    Education,
}

impl PlanTier {
    pub const ALL: [PlanTier; 3] = [PlanTier::Free, PlanTier::Premium, PlanTier::Education];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
            Self::Education => "education",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "free" => Some(Self::Free),
            "premium" => Some(Self::Premium),
            "education" => Some(Self::Education),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "active" => Some(Self::Active),
            "trialing" => Some(Self::Trialing),
            "past_due" | "pastdue" => Some(Self::PastDue),
            "canceled" | "cancelled" => Some(Self::Canceled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Feature {
    TutorQuestion,
    WeaknessReport,
    PremiumLessons,
    ReviewQuiz,
}

impl Feature {
    pub const ALL: [Feature; 4] = [
        Feature::TutorQuestion,
        Feature::WeaknessReport,
        Feature::PremiumLessons,
        Feature::ReviewQuiz,
    ];

    /// Key used in the usage counters table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TutorQuestion => "tutor_question",
            Self::WeaknessReport => "weakness_report",
            Self::PremiumLessons => "premium_lessons",
            Self::ReviewQuiz => "review_quiz",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("the {} plan does not include {}", .tier.as_str(), .feature.as_str())]
    FeatureLocked { feature: Feature, tier: PlanTier },
    #[error("daily limit of {limit} reached for {}", .feature.as_str())]
    QuotaExceeded { feature: Feature, limit: u32 },
    #[error("unknown plan tier: {0}")]
    InvalidTier(String),
    #[error("unknown plan status: {0}")]
    InvalidStatus(String),
    #[error("invalid user id: {0:?}")]
    InvalidUserId(String),
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

/// Tier whose features the user can use right now.
pub fn effective_tier(
    tier: PlanTier,
    status: PlanStatus,
    period_end_ms: Option<i64>,
    now_ms: i64,
) -> PlanTier {
    if tier == PlanTier::Free {
        return PlanTier::Free;
    }

    let keeps_access = match status {
        PlanStatus::Active | PlanStatus::Trialing => period_end_ms.map_or(true, |end| now_ms < end),
        PlanStatus::PastDue => {
            period_end_ms.map_or(true, |end| now_ms < end.saturating_add(PAST_DUE_GRACE_MS))
        }
        PlanStatus::Canceled => false,
    };

    if keeps_access {
        tier
    } else {
        PlanTier::Free
    }
}

pub fn feature_allowed(tier: PlanTier, feature: Feature) -> bool {
    match (tier, feature) {
        (PlanTier::Free, Feature::WeaknessReport | Feature::PremiumLessons) => false,
        _ => true,
    }
}

/// `None` means unlimited. Only tutor questions are metered.
pub fn daily_quota(tier: PlanTier, feature: Feature, limits: &PlanLimits) -> Option<u32> {
    match feature {
        Feature::TutorQuestion => match tier {
            PlanTier::Free => limits.free_daily_questions,
            PlanTier::Premium => limits.premium_daily_questions,
            PlanTier::Education => limits.education_daily_questions,
        },
        _ => None,
    }
}

/// Resolved plan of a stored user. Unknown values fall back to free/canceled.
pub fn user_plan(user: &UserRow, now_ms: i64) -> (PlanTier, PlanStatus, PlanTier) {
    let tier = PlanTier::parse(&user.plan_tier).unwrap_or(PlanTier::Free);
    let status = PlanStatus::parse(&user.plan_status).unwrap_or(PlanStatus::Canceled);
    let effective = effective_tier(tier, status, user.period_end_at, now_ms);
    (tier, status, effective)
}

pub fn require(user: &UserRow, feature: Feature, now_ms: i64) -> Result<PlanTier, PlanError> {
    let (_, _, effective) = user_plan(user, now_ms);
    if !feature_allowed(effective, feature) {
        return Err(PlanError::FeatureLocked {
            feature,
            tier: effective,
        });
    }
    Ok(effective)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageGrant {
    pub used_today: i64,
    pub daily_limit: Option<u32>,
}

/// Checks the entitlement and records one use of `feature` for today.
pub async fn consume(
    pool: &SqlitePool,
    user: &UserRow,
    feature: Feature,
    limits: &PlanLimits,
    now_ms: i64,
) -> Result<UsageGrant, PlanError> {
    let tier = require(user, feature, now_ms)?;
    let limit = daily_quota(tier, feature, limits);
    let day = day_key(now_ms);

    match usage::try_increment(pool, &user.id, feature.as_str(), &day, limit).await? {
        Some(used_today) => Ok(UsageGrant {
            used_today,
            daily_limit: limit,
        }),
        None => {
            let limit = limit.unwrap_or(0);
            tracing::info!(user_id = %user.id, feature = feature.as_str(), limit, "daily quota exhausted");
            Err(PlanError::QuotaExceeded { feature, limit })
        }
    }
}

/// Returns one unit of today's usage after the metered work failed.
pub async fn release(
    pool: &SqlitePool,
    user_id: &str,
    feature: Feature,
    now_ms: i64,
) -> Result<(), PlanError> {
    usage::release(pool, user_id, feature.as_str(), &day_key(now_ms)).await?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entitlement {
    pub feature: Feature,
    pub allowed: bool,
    pub daily_limit: Option<u32>,
    pub used_today: i64,
    pub remaining_today: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOverview {
    pub user_id: String,
    pub tier: PlanTier,
    pub status: PlanStatus,
    pub effective_tier: PlanTier,
    pub period_end_at: Option<String>,
    pub in_grace_period: bool,
    pub entitlements: Vec<Entitlement>,
}

pub async fn plan_overview(
    pool: &SqlitePool,
    user: &UserRow,
    limits: &PlanLimits,
    now_ms: i64,
) -> Result<PlanOverview, PlanError> {
    let (tier, status, effective) = user_plan(user, now_ms);
    let used = usage::usage_for_day(pool, &user.id, &day_key(now_ms)).await?;

    let entitlements = Feature::ALL
        .iter()
        .map(|&feature| {
            let allowed = feature_allowed(effective, feature);
            let daily_limit = daily_quota(effective, feature, limits);
            let used_today = used
                .iter()
                .find(|(key, _)| key == feature.as_str())
                .map_or(0, |(_, count)| *count);
            Entitlement {
                feature,
                allowed,
                daily_limit,
                used_today,
                remaining_today: daily_limit.map(|l| (i64::from(l) - used_today).max(0)),
            }
        })
        .collect();

    let in_grace_period = status == PlanStatus::PastDue
        && effective != PlanTier::Free
        && user.period_end_at.is_some_and(|end| now_ms >= end);

    Ok(PlanOverview {
        user_id: user.id.clone(),
        tier,
        status,
        effective_tier: effective,
        period_end_at: user.period_end_at.and_then(format_timestamp_ms_iso_millis),
        in_grace_period,
        entitlements,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierInfo {
    pub tier: PlanTier,
    pub features: Vec<Feature>,
    pub daily_questions: Option<u32>,
}

pub fn tier_catalog(limits: &PlanLimits) -> Vec<TierInfo> {
    PlanTier::ALL
        .iter()
        .map(|&tier| TierInfo {
            tier,
            features: Feature::ALL
                .iter()
                .copied()
                .filter(|f| feature_allowed(tier, *f))
                .collect(),
            daily_questions: daily_quota(tier, Feature::TutorQuestion, limits),
        })
        .collect()
}

/// Admin-side plan change. Provisions the user when unknown.
pub async fn set_plan(
    pool: &SqlitePool,
    user_id: &str,
    tier: &str,
    status: &str,
    period_end_ms: Option<i64>,
    now_ms: i64,
) -> Result<UserRow, PlanError> {
    if !users::is_valid_user_id(user_id) {
        return Err(PlanError::InvalidUserId(user_id.to_string()));
    }
    let tier = PlanTier::parse(tier).ok_or_else(|| PlanError::InvalidTier(tier.to_string()))?;
    let status =
        PlanStatus::parse(status).ok_or_else(|| PlanError::InvalidStatus(status.to_string()))?;

    users::ensure_user(pool, user_id, now_ms).await?;
    users::update_plan(pool, user_id, tier.as_str(), status.as_str(), period_end_ms, now_ms).await?;

    tracing::info!(
        user_id,
        tier = tier.as_str(),
        status = status.as_str(),
        period_end_ms,
        "plan updated"
    );

    Ok(users::ensure_user(pool, user_id, now_ms).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_pool;

    const NOW: i64 = 1_700_000_000_000;

    fn user(tier: &str, status: &str, period_end_at: Option<i64>) -> UserRow {
        UserRow {
            id: "u1".to_string(),
            plan_tier: tier.to_string(),
            plan_status: status.to_string(),
            period_end_at,
            created_at: NOW,
            updated_at: NOW,
        }
    }

    #[test]
    fn test_effective_tier_active_and_expired() {
        assert_eq!(
            effective_tier(PlanTier::Premium, PlanStatus::Active, Some(NOW + 1), NOW),
            PlanTier::Premium
        );
        assert_eq!(
            effective_tier(PlanTier::Premium, PlanStatus::Active, Some(NOW), NOW),
            PlanTier::Free
        );
        assert_eq!(
            effective_tier(PlanTier::Education, PlanStatus::Trialing, None, NOW),
            PlanTier::Education
        );
        assert_eq!(
            effective_tier(PlanTier::Premium, PlanStatus::Canceled, Some(NOW + DAY_MS), NOW),
            PlanTier::Free
        );
    }

    #[test]
    fn test_past_due_grace_period() {
        let ended = NOW - 2 * DAY_MS;
        assert_eq!(
            effective_tier(PlanTier::Premium, PlanStatus::PastDue, Some(ended), NOW),
            PlanTier::Premium
        );
        let long_ended = NOW - 4 * DAY_MS;
        assert_eq!(
            effective_tier(PlanTier::Premium, PlanStatus::PastDue, Some(long_ended), NOW),
            PlanTier::Free
        );
    }

    #[test]
    fn test_feature_matrix() {
        assert!(feature_allowed(PlanTier::Free, Feature::TutorQuestion));
        assert!(feature_allowed(PlanTier::Free, Feature::ReviewQuiz));
        assert!(!feature_allowed(PlanTier::Free, Feature::WeaknessReport));
        assert!(!feature_allowed(PlanTier::Free, Feature::PremiumLessons));
        for feature in Feature::ALL {
            assert!(feature_allowed(PlanTier::Premium, feature));
            assert!(feature_allowed(PlanTier::Education, feature));
        }
    }

    #[test]
    fn test_daily_quota_from_limits() {
        let limits = PlanLimits::default();
        assert_eq!(daily_quota(PlanTier::Free, Feature::TutorQuestion, &limits), Some(5));
        assert_eq!(daily_quota(PlanTier::Premium, Feature::TutorQuestion, &limits), None);
        assert_eq!(daily_quota(PlanTier::Education, Feature::TutorQuestion, &limits), Some(50));
        assert_eq!(daily_quota(PlanTier::Free, Feature::ReviewQuiz, &limits), None);
    }

    #[test]
    fn test_parse_round_trip() {
        for tier in PlanTier::ALL {
            assert_eq!(PlanTier::parse(tier.as_str()), Some(tier));
        }
        assert_eq!(PlanStatus::parse("past-due"), Some(PlanStatus::PastDue));
        assert_eq!(PlanStatus::parse("cancelled"), Some(PlanStatus::Canceled));
        assert_eq!(PlanTier::parse("gold"), None);
    }

    #[test]
    fn test_require_locks_premium_features_for_free() {
        let free = user("free", "active", None);
        let err = require(&free, Feature::WeaknessReport, NOW).unwrap_err();
        assert!(matches!(err, PlanError::FeatureLocked { tier: PlanTier::Free, .. }));

        let lapsed = user("premium", "active", Some(NOW - 1));
        assert!(require(&lapsed, Feature::PremiumLessons, NOW).is_err());

        let premium = user("premium", "active", Some(NOW + DAY_MS));
        assert_eq!(require(&premium, Feature::PremiumLessons, NOW).unwrap(), PlanTier::Premium);
    }

    #[tokio::test]
    async fn test_consume_enforces_quota_per_day() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_pool(&dir.path().join("plan.db")).await.unwrap();
        let stored = users::ensure_user(&pool, "u1", NOW).await.unwrap();
        let limits = PlanLimits {
            free_daily_questions: Some(2),
            ..PlanLimits::default()
        };

        let first = consume(&pool, &stored, Feature::TutorQuestion, &limits, NOW).await.unwrap();
        assert_eq!(first.used_today, 1);
        let second = consume(&pool, &stored, Feature::TutorQuestion, &limits, NOW).await.unwrap();
        assert_eq!(second.used_today, 2);
        let third = consume(&pool, &stored, Feature::TutorQuestion, &limits, NOW).await;
        assert!(matches!(third, Err(PlanError::QuotaExceeded { limit: 2, .. })));

        // next day starts fresh
        let tomorrow = consume(&pool, &stored, Feature::TutorQuestion, &limits, NOW + DAY_MS)
            .await
            .unwrap();
        assert_eq!(tomorrow.used_today, 1);
    }

    #[tokio::test]
    async fn test_set_plan_and_overview() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_pool(&dir.path().join("plan.db")).await.unwrap();

        let err = set_plan(&pool, "u2", "gold", "active", None, NOW).await.unwrap_err();
        assert!(matches!(err, PlanError::InvalidTier(_)));

        let err = set_plan(&pool, "bad id;drop", "premium", "active", None, NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, PlanError::InvalidUserId(_)));
        assert!(users::get_user(&pool, "bad id;drop").await.unwrap().is_none());

        let updated = set_plan(&pool, "u2", "premium", "past_due", Some(NOW - DAY_MS), NOW)
            .await
            .unwrap();
        assert_eq!(updated.plan_tier, "premium");

        let overview = plan_overview(&pool, &updated, &PlanLimits::default(), NOW)
            .await
            .unwrap();
        assert_eq!(overview.effective_tier, PlanTier::Premium);
        assert!(overview.in_grace_period);
        assert!(overview.entitlements.iter().all(|e| e.allowed));
    }

    mod props {
        use crate::services::plan::{effective_tier, PlanStatus, PlanTier, PAST_DUE_GRACE_MS};
        use proptest::prelude::*;

        fn tier() -> impl Strategy<Value = PlanTier> {
            prop_oneof![Just(PlanTier::Free), Just(PlanTier::Premium), Just(PlanTier::Education)]
        }

        fn status() -> impl Strategy<Value = PlanStatus> {
            prop_oneof![
                Just(PlanStatus::Active),
                Just(PlanStatus::Trialing),
                Just(PlanStatus::PastDue),
                Just(PlanStatus::Canceled),
            ]
        }

        proptest! {
            #[test]
            fn effective_tier_is_stored_tier_or_free(
                tier in tier(),
                status in status(),
                end in proptest::option::of(0i64..4_000_000_000_000),
                now in 0i64..4_000_000_000_000,
            ) {
                let effective = effective_tier(tier, status, end, now);
                prop_assert!(effective == tier || effective == PlanTier::Free);
                if status == PlanStatus::Canceled {
                    prop_assert_eq!(effective, PlanTier::Free);
                }
            }

            #[test]
            fn past_due_never_outlasts_grace(
                tier in tier(),
                end in 0i64..4_000_000_000_000,
                after in 0i64..1_000_000_000,
            ) {
                let now = end + PAST_DUE_GRACE_MS + after;
                prop_assert_eq!(
                    effective_tier(tier, PlanStatus::PastDue, Some(end), now),
                    PlanTier::Free
                );
            }
        }
    }
}
