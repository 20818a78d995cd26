use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, RocksDb};
use surrealdb::sql::Thing;

use crate::services::profiles::{Gender, UserProfile};
use crate::services::retrieval::RecipeCandidate;

/// One transcript line flushed at the end of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub role: String,
    pub content: String,
    pub timestamp: String,
}

/// OAuth tokens for a user's Google Calendar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarCredential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// RFC 3339; `None` means the provider gave no expiry
    pub expires_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserRow {
    id: Thing,
    name: String,
    gender: String,
    profession: Option<String>,
    #[serde(default)]
    likes: Vec<String>,
    #[serde(default)]
    dislikes: Vec<String>,
    #[serde(default)]
    allergies: Vec<String>,
    #[serde(default)]
    favorite_recipes: Vec<String>,
    #[serde(default)]
    google_calendar_connected: bool,
}

impl UserRow {
    fn into_profile(self) -> UserProfile {
        UserProfile {
            user_id: StorageManager::normalize_user_id(&self.id.to_string()).to_string(),
            name: self.name,
            gender: Gender::parse(&self.gender),
            profession: self.profession.filter(|value| !value.trim().is_empty()),
            likes: self.likes,
            dislikes: self.dislikes,
            allergies: self.allergies,
            favorite_recipes: self.favorite_recipes,
            calendar_connected: self.google_calendar_connected,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatLogRecord {
    user: Thing,
    messages: Vec<LogMessage>,
    created_at: String,
}

/// Manages persistent storage of users, recipes, credentials and chat logs using SurrealDB
#[derive(Clone)]
pub struct StorageManager {
    db: Surreal<Db>,
}

impl StorageManager {
    /// Creates a new storage manager and initializes the database
    pub async fn new() -> Result<Self> {
        let project_data_dir = Self::project_data_dir()?;
        std::fs::create_dir_all(&project_data_dir)?;
        let db_path = project_data_dir.join("sufra.db");

        let db = Surreal::new::<RocksDb>(db_path).await?;
        db.use_ns("sufra").use_db("main").await?;

        let manager = Self { db };
        manager.init_db().await?;

        Ok(manager)
    }

    async fn init_db(&self) -> Result<()> {
        self.db.query("
            DEFINE TABLE IF NOT EXISTS user SCHEMAFULL;
            DEFINE FIELD email ON user TYPE string;
            DEFINE FIELD name ON user TYPE string;
            DEFINE FIELD gender ON user TYPE string;
            DEFINE FIELD profession ON user TYPE option<string>;
            DEFINE FIELD likes ON user TYPE array<string> DEFAULT [];
            DEFINE FIELD dislikes ON user TYPE array<string> DEFAULT [];
            DEFINE FIELD allergies ON user TYPE array<string> DEFAULT [];
            DEFINE FIELD favorite_recipes ON user TYPE array<string> DEFAULT [];
            DEFINE FIELD google_calendar_connected ON user TYPE bool DEFAULT false;
            DEFINE INDEX IF NOT EXISTS idx_user_email ON user FIELDS email UNIQUE;
        ").await?;

        self.db.query("
            DEFINE TABLE IF NOT EXISTS calendar_credential SCHEMAFULL;
            DEFINE FIELD user ON calendar_credential TYPE record<user>;
            DEFINE FIELD access_token ON calendar_credential TYPE string;
            DEFINE FIELD refresh_token ON calendar_credential TYPE option<string>;
            DEFINE FIELD expires_at ON calendar_credential TYPE option<string>;
            DEFINE INDEX IF NOT EXISTS idx_credential_user ON calendar_credential FIELDS user UNIQUE;
        ").await?;

        self.db.query("
            DEFINE TABLE IF NOT EXISTS recipe SCHEMAFULL;
            DEFINE FIELD title ON recipe TYPE string;
            DEFINE FIELD document ON recipe TYPE string;
            DEFINE FIELD embedding ON recipe TYPE option<array<float>>;
        ").await?;

        self.db.query("
            DEFINE TABLE IF NOT EXISTS chat_log SCHEMAFULL;
            DEFINE FIELD user ON chat_log TYPE record<user>;
            DEFINE FIELD messages ON chat_log TYPE array<object>;
            DEFINE FIELD messages.* ON chat_log FLEXIBLE TYPE object;
            DEFINE FIELD created_at ON chat_log TYPE string;
        ").await?;

        Ok(())
    }

    fn project_data_dir() -> Result<PathBuf> {
        let current_dir = std::env::current_dir()?;
        Ok(current_dir.join("data"))
    }

    fn normalize_user_id(id: &str) -> &str {
        id.strip_prefix("user:").unwrap_or(id)
    }

    fn user_ref(id: &str) -> Thing {
        Thing::from(("user", Self::normalize_user_id(id)))
    }

    /// Loads the profile registered under `email`
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserProfile>> {
        let mut response = self.db.query("
            SELECT * FROM user WHERE email = $email LIMIT 1
        ")
        .bind(("email", email.trim().to_lowercase()))
        .await?;

        let rows: Vec<UserRow> = response.take(0)?;
        Ok(rows.into_iter().next().map(UserRow::into_profile))
    }

    /// Current calendar-connected flag straight from the user table
    pub async fn user_calendar_connected(&self, user_id: &str) -> Result<bool> {
        #[derive(Debug, Deserialize)]
        struct FlagRow {
            google_calendar_connected: bool,
        }

        let mut response = self.db.query("
            SELECT google_calendar_connected FROM $user
        ")
        .bind(("user", Self::user_ref(user_id)))
        .await?;

        let rows: Vec<FlagRow> = response.take(0)?;
        Ok(rows.first().is_some_and(|row| row.google_calendar_connected))
    }

    /// Adds a recipe title to the user's favorites (no duplicates)
    pub async fn add_favorite_recipe(&self, user_id: &str, title: &str) -> Result<()> {
        self.db.query("
            UPDATE $user SET favorite_recipes = array::union(favorite_recipes, [$title])
        ")
        .bind(("user", Self::user_ref(user_id)))
        .bind(("title", title.to_string()))
        .await?
        .check()?;
        Ok(())
    }

    pub async fn load_calendar_credential(&self, user_id: &str) -> Result<Option<CalendarCredential>> {
        let mut response = self.db.query("
            SELECT access_token, refresh_token, expires_at
            FROM calendar_credential
            WHERE user = $user
            LIMIT 1
        ")
        .bind(("user", Self::user_ref(user_id)))
        .await?;

        let rows: Vec<CalendarCredential> = response.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// Upserts the credential row and marks the user as connected
    pub async fn save_calendar_credential(
        &self,
        user_id: &str,
        credential: &CalendarCredential,
    ) -> Result<()> {
        self.db.query("
            DELETE calendar_credential WHERE user = $user;
            CREATE calendar_credential SET
                user = $user,
                access_token = $access_token,
                refresh_token = $refresh_token,
                expires_at = $expires_at;
            UPDATE $user SET google_calendar_connected = true;
        ")
        .bind(("user", Self::user_ref(user_id)))
        .bind(("access_token", credential.access_token.clone()))
        .bind(("refresh_token", credential.refresh_token.clone()))
        .bind(("expires_at", credential.expires_at.clone()))
        .await?
        .check()?;
        Ok(())
    }

    /// Nearest recipes by cosine similarity; distance is `1 - similarity`
    pub async fn search_recipes(
        &self,
        query_embedding: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<RecipeCandidate>> {
        #[derive(Debug, Deserialize)]
        struct SearchResult {
            title: String,
            document: String,
            similarity: f32,
        }

        let mut response = self.db.query("
            SELECT
                title,
                document,
                vector::similarity::cosine(embedding, $query_embedding) AS similarity
            FROM recipe
            WHERE embedding IS NOT NONE
            ORDER BY similarity DESC
            LIMIT $limit
        ")
        .bind(("query_embedding", query_embedding))
        .bind(("limit", limit))
        .await?;

        let results: Vec<SearchResult> = response.take(0)?;

        Ok(results
            .into_iter()
            .map(|r| RecipeCandidate {
                title: r.title,
                document: r.document,
                distance: 1.0 - r.similarity,
            })
            .collect())
    }

    /// Persists one session transcript
    pub async fn save_chat_log(&self, user_id: &str, messages: &[LogMessage]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let _: Option<serde_json::Value> = self.db
            .create("chat_log")
            .content(ChatLogRecord {
                user: Self::user_ref(user_id),
                messages: messages.to_vec(),
                created_at: chrono::Local::now().to_rfc3339(),
            })
            .await?;
        Ok(())
    }
}
