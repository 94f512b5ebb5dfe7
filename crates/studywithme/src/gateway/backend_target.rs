// studywithme/src/gateway/backend_target.rs
// Lock-free backend base URL using atomic pointer swapping

use std::sync::Arc;
use arc_swap::ArcSwap;
use tracing::{info, warn};

#[derive(Clone)]
pub struct BackendTarget {
    inner: Arc<ArcSwap<String>>,
}

impl BackendTarget {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ArcSwap::new(Arc::new(normalize(initial.into())))),
        }
    }

    pub fn set(&self, new_target: impl Into<String>) {
        let new_target = normalize(new_target.into());
        let current = self.inner.load();

        if current.is_empty() {
            info!("Setting initial backend target to: {}", new_target);
            self.inner.store(Arc::new(new_target));
        } else if **current != new_target {
            info!("Switching backend target from {} → {}", **current, new_target);
            self.inner.store(Arc::new(new_target));
        } else {
            warn!("backend target set() called, but no change (still {})", new_target);
        }
    }

    pub fn get(&self) -> String {
        (**self.inner.load()).clone()
    }

    pub fn is_initialized(&self) -> bool {
        !self.inner.load().is_empty()
    }

    fn endpoint(&self, path: &str) -> String {
        let base = self.get();
        if base.is_empty() {
            warn!("Backend target not initialized yet, returning relative URL");
        }
        format!("{}{}", base, path)
    }

    pub fn chat_url(&self) -> String {
        self.endpoint("/chat")
    }

    pub fn quiz_url(&self) -> String {
        self.endpoint("/quiz")
    }

    pub fn quiz_answer_url(&self) -> String {
        self.endpoint("/quiz/answer")
    }

    pub fn image_url(&self) -> String {
        self.endpoint("/image")
    }

    pub fn flag_url(&self) -> String {
        self.endpoint("/flag")
    }
}

fn normalize(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}
