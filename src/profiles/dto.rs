use serde::Deserialize;
use serde_json::Value;
use sqlx::{postgres::PgArguments, query::QueryAs, Postgres};

use super::repo::ProfileInput;
use super::repo_types::{ArtistProfile, FanProfile, LicensorProfile, ServiceProviderProfile};

type Q<'q, R> = QueryAs<'q, Postgres, R, PgArguments>;

#[derive(Debug, Deserialize)]
pub struct ArtistProfileInput {
    pub stage_name: Option<String>,
    pub legal_name: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub pro_affiliation: Option<String>,
    pub ipi_number: Option<String>,
    pub social_links: Option<Value>,
    pub profile_image_url: Option<String>,
}

impl ProfileInput for ArtistProfileInput {
    type Record = ArtistProfile;
    const TABLE: &'static str = "artist_profiles";
    const COLUMNS: &'static [&'static str] = &[
        "stage_name", "legal_name", "bio", "website", "pro_affiliation", "ipi_number",
        "social_links", "profile_image_url",
    ];
    const REQUIRED: &'static str = "stage_name";

    fn required_value(&self) -> Option<&str> {
        self.stage_name.as_deref()
    }

    fn bind<'q>(self, q: Q<'q, Self::Record>) -> Q<'q, Self::Record> {
        q.bind(self.stage_name.map(|s| s.trim().to_string()))
            .bind(self.legal_name)
            .bind(self.bio)
            .bind(self.website)
            .bind(self.pro_affiliation)
            .bind(self.ipi_number)
            .bind(self.social_links)
            .bind(self.profile_image_url)
    }
}

#[derive(Debug, Deserialize)]
pub struct FanProfileInput {
    pub display_name: Option<String>,
    pub music_preferences: Option<Value>,
    pub listening_history: Option<Value>,
}

impl ProfileInput for FanProfileInput {
    type Record = FanProfile;
    const TABLE: &'static str = "fan_profiles";
    const COLUMNS: &'static [&'static str] = &["display_name", "music_preferences", "listening_history"];
    const REQUIRED: &'static str = "display_name";

    fn required_value(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    fn bind<'q>(self, q: Q<'q, Self::Record>) -> Q<'q, Self::Record> {
        q.bind(self.display_name.map(|s| s.trim().to_string()))
            .bind(self.music_preferences)
            .bind(self.listening_history)
    }
}

#[derive(Debug, Deserialize)]
pub struct LicensorProfileInput {
    pub company_name: Option<String>,
    pub contact_person: Option<String>,
    pub industry: Option<String>,
    pub budget_range: Option<String>,
    pub licensing_needs: Option<String>,
}

impl ProfileInput for LicensorProfileInput {
    type Record = LicensorProfile;
    const TABLE: &'static str = "licensor_profiles";
    const COLUMNS: &'static [&'static str] = &[
        "company_name", "contact_person", "industry", "budget_range", "licensing_needs",
    ];
    const REQUIRED: &'static str = "company_name";

    fn required_value(&self) -> Option<&str> {
        self.company_name.as_deref()
    }

    fn bind<'q>(self, q: Q<'q, Self::Record>) -> Q<'q, Self::Record> {
        q.bind(self.company_name.map(|s| s.trim().to_string()))
            .bind(self.contact_person)
            .bind(self.industry)
            .bind(self.budget_range)
            .bind(self.licensing_needs)
    }
}

#[derive(Debug, Deserialize)]
pub struct ServiceProviderProfileInput {
    pub business_name: Option<String>,
    pub service_categories: Option<Value>,
    pub skills: Option<Value>,
    pub experience_years: Option<i32>,
    pub portfolio_urls: Option<Value>,
    pub rates: Option<Value>,
    pub availability_status: Option<String>,
}

impl ProfileInput for ServiceProviderProfileInput {
    type Record = ServiceProviderProfile;
    const TABLE: &'static str = "service_provider_profiles";
    const COLUMNS: &'static [&'static str] = &[
        "business_name", "service_categories", "skills", "experience_years", "portfolio_urls",
        "rates", "availability_status",
    ];
    const REQUIRED: &'static str = "business_name";

    fn required_value(&self) -> Option<&str> {
        self.business_name.as_deref()
    }

    fn bind<'q>(self, q: Q<'q, Self::Record>) -> Q<'q, Self::Record> {
        q.bind(self.business_name.map(|s| s.trim().to_string()))
            .bind(self.service_categories)
            .bind(self.skills)
            .bind(self.experience_years)
            .bind(self.portfolio_urls)
            .bind(self.rates)
            .bind(self.availability_status)
    }
}
