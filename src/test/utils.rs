use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Once;

use rocket::http::{ContentType, Header, Status};
use rocket::local::asynchronous::Client;
use serde_json::json;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::api::LoginResponse;
use crate::catalog::{create_behavior, create_exercise, create_skill, link_behavior_exercise};
use crate::config::AppConfig;
use crate::db::{create_user, run_migrations};
use crate::dogs::create_dog;
use crate::error::AppError;
use crate::init_rocket;
use crate::sessions::create_session;

static INIT: Once = Once::new();
pub static STANDARD_PASSWORD: &str = "password123";
pub static ADMIN_EMAIL: &str = "admin@example.com";
pub static TRAINER_EMAIL: &str = "trainer@example.com";

pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = env_logger::builder()
            .parse_filters("debug")
            .is_test(true)
            .try_init();
    });
}

/// In-memory database with migrations applied. A single connection keeps
/// every query on the same memory image.
pub async fn memory_pool() -> Result<Pool<Sqlite>, AppError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

struct TestUser {
    email: String,
    is_admin: bool,
}

struct TestBehavior {
    skill: String,
    name: String,
}

struct TestLink {
    behavior: String,
    exercise: String,
    strength: i64,
}

#[derive(Default)]
pub struct TestDbBuilder {
    users: Vec<TestUser>,
    skills: Vec<String>,
    behaviors: Vec<TestBehavior>,
    exercises: Vec<String>,
    links: Vec<TestLink>,
    dogs: Vec<String>,
    sessions: usize,
}

impl TestDbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admin(mut self, email: &str) -> Self {
        self.users.push(TestUser {
            email: email.to_string(),
            is_admin: true,
        });
        self
    }

    pub fn trainer(mut self, email: &str) -> Self {
        self.users.push(TestUser {
            email: email.to_string(),
            is_admin: false,
        });
        self
    }

    pub fn skill(mut self, name: &str) -> Self {
        self.skills.push(name.to_string());
        self
    }

    pub fn behavior(mut self, skill: &str, name: &str) -> Self {
        self.behaviors.push(TestBehavior {
            skill: skill.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn exercise(mut self, name: &str) -> Self {
        self.exercises.push(name.to_string());
        self
    }

    pub fn link(mut self, behavior: &str, exercise: &str, strength: i64) -> Self {
        self.links.push(TestLink {
            behavior: behavior.to_string(),
            exercise: exercise.to_string(),
            strength,
        });
        self
    }

    pub fn dog(mut self, name: &str) -> Self {
        self.dogs.push(name.to_string());
        self
    }

    pub fn session(mut self) -> Self {
        self.sessions += 1;
        self
    }

    pub async fn build(self) -> Result<TestDb, AppError> {
        init_test_logging();
        let pool = memory_pool().await?;
        self.seed(pool).await
    }

    /// Seeds an already migrated pool, e.g. a file-backed one.
    pub async fn seed(self, pool: Pool<Sqlite>) -> Result<TestDb, AppError> {
        let mut ids = HashMap::new();

        for user in &self.users {
            let created = create_user(&pool, &user.email, STANDARD_PASSWORD, user.is_admin).await?;
            ids.insert(format!("user:{}", user.email), created.id);
        }
        for name in &self.skills {
            let skill = create_skill(&pool, name, None).await?;
            ids.insert(format!("skill:{}", name), skill.id);
        }
        for behavior in &self.behaviors {
            let skill_id = lookup(&ids, "skill", &behavior.skill)?;
            let created = create_behavior(&pool, skill_id, &behavior.name, None).await?;
            ids.insert(format!("behavior:{}", behavior.name), created.id);
        }
        for name in &self.exercises {
            let exercise = create_exercise(&pool, name, None).await?;
            ids.insert(format!("exercise:{}", name), exercise.id);
        }
        for link in &self.links {
            let behavior_id = lookup(&ids, "behavior", &link.behavior)?;
            let exercise_id = lookup(&ids, "exercise", &link.exercise)?;
            link_behavior_exercise(&pool, behavior_id, exercise_id, link.strength).await?;
        }
        for name in &self.dogs {
            let dog = create_dog(&pool, name, None, None).await?;
            ids.insert(format!("dog:{}", name), dog.id);
        }

        let mut session_ids = Vec::new();
        for _ in 0..self.sessions {
            session_ids.push(create_session(&pool, None, None, None).await?.id);
        }

        Ok(TestDb {
            pool,
            ids,
            session_ids,
        })
    }
}

fn lookup(ids: &HashMap<String, i64>, kind: &str, name: &str) -> Result<i64, AppError> {
    ids.get(&format!("{}:{}", kind, name))
        .copied()
        .ok_or_else(|| AppError::Internal(format!("test fixture has no {} '{}'", kind, name)))
}

pub struct TestDb {
    pub pool: Pool<Sqlite>,
    ids: HashMap<String, i64>,
    pub session_ids: Vec<i64>,
}

impl TestDb {
    fn id(&self, kind: &str, name: &str) -> i64 {
        lookup(&self.ids, kind, name).unwrap()
    }

    pub fn user_id(&self, email: &str) -> i64 {
        self.id("user", email)
    }

    pub fn skill_id(&self, name: &str) -> i64 {
        self.id("skill", name)
    }

    pub fn behavior_id(&self, name: &str) -> i64 {
        self.id("behavior", name)
    }

    pub fn exercise_id(&self, name: &str) -> i64 {
        self.id("exercise", name)
    }

    pub fn dog_id(&self, name: &str) -> i64 {
        self.id("dog", name)
    }

    pub fn session_id(&self) -> i64 {
        self.session_ids[0]
    }
}

/// One admin, one trainer, a trailing skill with two behaviors, an exercise
/// linked to the first behavior, two dogs and one open session.
pub async fn create_standard_test_db() -> TestDb {
    TestDbBuilder::new()
        .admin(ADMIN_EMAIL)
        .trainer(TRAINER_EMAIL)
        .skill("Trailing")
        .behavior("Trailing", "Start")
        .behavior("Trailing", "Indication")
        .exercise("Runaway")
        .link("Start", "Runaway", 3)
        .dog("Rex")
        .dog("Ayla")
        .session()
        .build()
        .await
        .expect("Failed to build test database")
}

pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
    let figment = rocket::Config::figment()
        .merge(("log_level", "off"))
        .merge(("secret_key", "hPRYyVRiMyxpw5sBB1XeCMN1kFsDCqKvBi2QJxBVHQk="));
    let rocket = init_rocket(test_db.pool.clone(), figment, AppConfig::default());

    let client = Client::tracked(rocket)
        .await
        .expect("Failed to create test client");

    (client, test_db)
}

/// Logs in and returns the issued token. The tracked client also keeps the
/// auth cookie for later requests.
pub async fn login_test_user(client: &Client, email: &str) -> String {
    let response = client
        .post("/auth/login")
        .header(ContentType::JSON)
        .body(json!({ "email": email, "password": STANDARD_PASSWORD }).to_string())
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Ok, "login failed for {}", email);
    let body: LoginResponse = response.into_json().await.expect("login response body");
    body.token
}

pub fn bearer(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {}", token))
}
