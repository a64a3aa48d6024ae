use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ArtistProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub stage_name: String,
    pub legal_name: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub pro_affiliation: Option<String>,
    pub ipi_number: Option<String>,
    pub social_links: Option<serde_json::Value>,
    pub profile_image_url: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FanProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
    pub music_preferences: Option<serde_json::Value>,
    pub listening_history: Option<serde_json::Value>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LicensorProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub company_name: String,
    pub contact_person: Option<String>,
    pub industry: Option<String>,
    pub budget_range: Option<String>,
    pub licensing_needs: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ServiceProviderProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub business_name: String,
    pub service_categories: Option<serde_json::Value>,
    pub skills: Option<serde_json::Value>,
    pub experience_years: Option<i32>,
    pub portfolio_urls: Option<serde_json::Value>,
    pub rates: Option<serde_json::Value>,
    pub availability_status: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
