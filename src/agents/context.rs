//! Brief generation agent

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::Agent;
use crate::models::{Meeting, NewContext};
use crate::services::{ContextGenerator, GeneratedContext, MeetingBriefRequest};
use crate::store::Store;

/// Generates briefs for upcoming meetings, a bounded batch per tick
pub struct ContextAgent {
    store: Store,
    generator: Arc<dyn ContextGenerator>,
    batch_size: usize,
    lookahead: Duration,
    generated: AtomicU64,
    generation_failures: AtomicU64,
}

impl ContextAgent {
    pub fn new(store: Store, generator: Arc<dyn ContextGenerator>, batch_size: usize, lookahead_days: i64) -> Self {
        Self {
            store,
            generator,
            batch_size,
            lookahead: Duration::days(lookahead_days),
            generated: AtomicU64::new(0),
            generation_failures: AtomicU64::new(0),
        }
    }

    pub fn contexts_generated(&self) -> u64 {
        self.generated.load(Ordering::Relaxed)
    }

    /// One pass at `now`; returns how many new briefs were stored
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let meetings = self
            .store
            .meetings_needing_context(now, now + self.lookahead, self.batch_size)?;
        if meetings.is_empty() {
            debug!("No meetings need a brief");
            return Ok(0);
        }

        let mut stored = 0;
        for meeting in &meetings {
            match self.process(meeting).await {
                Ok(true) => stored += 1,
                Ok(false) => {}
                Err(e) => warn!("Brief for '{}' ({}) not stored: {:#}", meeting.title, meeting.id, e),
            }
        }

        info!("Generated {} briefs for {} meetings", stored, meetings.len());
        Ok(stored)
    }

    async fn process(&self, meeting: &Meeting) -> Result<bool> {
        // A brief written elsewhere only needs the flag
        if self.store.context_for_meeting(&meeting.id)?.is_some() {
            self.store.mark_context_generated(&meeting.id)?;
            debug!("Meeting {} already has a brief", meeting.id);
            return Ok(false);
        }

        let request = MeetingBriefRequest {
            title: meeting.title.clone(),
            description: meeting.description.clone().unwrap_or_default(),
            attendee_emails: meeting.attendee_emails(),
            start_time: meeting.start_time,
        };

        let generated = match self.generator.generate_context(&request).await {
            Ok(g) => g,
            Err(e) => {
                self.generation_failures.fetch_add(1, Ordering::Relaxed);
                return Err(e.into());
            }
        };

        let inserted = self.store.insert_context_if_absent(&to_new_context(meeting, generated))?;
        if inserted {
            self.generated.fetch_add(1, Ordering::Relaxed);
            info!("Stored brief for '{}'", meeting.title);
        }
        Ok(inserted)
    }
}

fn to_new_context(meeting: &Meeting, generated: GeneratedContext) -> NewContext {
    NewContext {
        user_id: meeting.user_id.clone(),
        meeting_id: meeting.id.clone(),
        ai_brief: generated.brief,
        meeting_type: generated.meeting_type,
        key_topics: generated.key_topics,
        preparation_checklist: generated.checklist,
        attendee_context: generated.attendee_context,
        confidence_score: generated.confidence.min(100),
        ai_model_version: generated.model,
    }
}

#[async_trait]
impl Agent for ContextAgent {
    fn name(&self) -> &str {
        "context"
    }

    async fn tick(&self) -> Result<()> {
        self.run_at(Utc::now()).await.map(|_| ())
    }

    fn counters(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("contexts_generated", self.generated.load(Ordering::Relaxed)),
            ("generation_failures", self.generation_failures.load(Ordering::Relaxed)),
        ]
    }
}
