//! Application state: session store, material store, usage gate, prompts, and
//! the optional Gemini client.
//!
//! Sessions live in memory only (no persistence of session scores); materials
//! persist through `MaterialStore`. All of it is shared behind one `Arc`.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::config::{load_study_config_from_env, Limits, Prompts};
use crate::gemini::Gemini;
use crate::materials::MaterialStore;
use crate::quota::UsageGate;
use crate::session::QuizSession;

pub struct AppState {
    pub sessions: RwLock<HashMap<String, QuizSession>>,
    pub materials: MaterialStore,
    pub quota: UsageGate,
    pub gemini: Option<Gemini>,
    pub prompts: Prompts,
    pub limits: Limits,
    /// Paystack shared secret; webhook delivery is rejected without it.
    pub webhook_secret: Option<String>,
}

impl AppState {
    /// Build state from env: load config, open the material store, init Gemini.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_study_config_from_env().unwrap_or_default();
        let prompts = cfg.prompts;
        let limits = cfg.limits;

        let materials_path = std::env::var("MATERIALS_PATH")
            .unwrap_or_else(|_| "./data/materials.json".into());
        let materials = MaterialStore::open(materials_path, limits.max_materials);

        let gemini = Gemini::from_env();
        if let Some(g) = &gemini {
            info!(target: "sulva_backend", base_url = %g.base_url, model = %g.model, "Gemini enabled.");
        } else {
            warn!(target: "sulva_backend", "Gemini disabled (no GEMINI_API_KEY). Generation and grading endpoints will refuse.");
        }

        let webhook_secret = std::env::var("PAYSTACK_SECRET_KEY").ok();
        if webhook_secret.is_none() {
            warn!(target: "sulva_backend", "PAYSTACK_SECRET_KEY not set; billing webhook will reject deliveries.");
        }

        Self {
            sessions: RwLock::new(HashMap::new()),
            materials,
            quota: UsageGate::new(limits.daily_free_quota),
            gemini,
            prompts,
            limits,
            webhook_secret,
        }
    }
}
