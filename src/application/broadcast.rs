//! # Broadcast Scheduler
//!
//! Posts each channel's rotation of messages on repeat. A channel waits the
//! interval of the message it is about to send, sends it, then moves its cursor to
//! the next enabled message (wrapping). Send failures are logged and the rotation
//! carries on. Any reconfiguration, and every return to ACTIVE, restarts all
//! channels from the start of their rotation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::application::handle::TransportHandleProvider;
use crate::application::supervisor::SessionListener;
use crate::application::timer::ScheduledTask;
use crate::domain::traits::{Clock, ContentProvider, StateStore};
use crate::domain::types::{
    BroadcastChannelSchedule, BroadcastMessage, ChannelId, MediaKind, OutboundPayload,
};

type Progress = Arc<Mutex<HashMap<ChannelId, BroadcastChannelSchedule>>>;

pub struct BroadcastScheduler {
    store: Arc<dyn StateStore>,
    handle: TransportHandleProvider,
    content: Arc<dyn ContentProvider>,
    clock: Arc<dyn Clock>,
    timers: Mutex<HashMap<ChannelId, ScheduledTask>>,
    progress: Progress,
    restart_lock: tokio::sync::Mutex<()>,
}

impl BroadcastScheduler {
    pub fn new(
        store: Arc<dyn StateStore>,
        handle: TransportHandleProvider,
        content: Arc<dyn ContentProvider>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            handle,
            content,
            clock,
            timers: Mutex::new(HashMap::new()),
            progress: Arc::new(Mutex::new(HashMap::new())),
            restart_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Replaces a channel's rotation, persists it and restarts every channel.
    pub async fn configure(&self, channel: &str, messages: Vec<BroadcastMessage>) -> anyhow::Result<()> {
        let schedule = BroadcastChannelSchedule::new(channel, messages);
        self.store.save_schedule(&schedule).await?;
        tracing::info!(
            "Broadcast for {} configured with {} message(s)",
            channel,
            schedule.messages.len()
        );
        self.restart_all().await
    }

    /// Stores configured rotations for channels the store doesn't know yet.
    /// Channels already persisted keep their stored rotation.
    pub async fn seed(&self, seeds: &HashMap<ChannelId, Vec<BroadcastMessage>>) -> anyhow::Result<usize> {
        let known: Vec<ChannelId> = self
            .store
            .load_schedules()
            .await?
            .into_iter()
            .map(|s| s.channel)
            .collect();
        let mut seeded = 0;
        for (channel, messages) in seeds {
            if known.contains(channel) {
                continue;
            }
            self.store
                .save_schedule(&BroadcastChannelSchedule::new(channel.as_str(), messages.clone()))
                .await?;
            seeded += 1;
        }
        Ok(seeded)
    }

    /// Cancels every channel's timer and re-arms them from the persisted schedules.
    /// Concurrent restarts run one at a time.
    pub async fn restart_all(&self) -> anyhow::Result<()> {
        let _restarting = self.restart_lock.lock().await;
        let schedules = self.store.load_schedules().await?;
        self.stop_all();

        let mut armed = HashMap::new();
        for schedule in schedules {
            let Some(first) = schedule.next_schedulable(0) else {
                tracing::debug!("Broadcast channel {} has nothing to send", schedule.channel);
                continue;
            };
            let channel = schedule.channel.clone();
            armed.insert(channel, self.arm(schedule, first));
        }
        tracing::info!("Broadcast scheduling running for {} channel(s)", armed.len());
        if let Ok(mut timers) = self.timers.lock() {
            *timers = armed;
        }
        Ok(())
    }

    pub fn stop_all(&self) {
        if let Ok(mut timers) = self.timers.lock() {
            timers.clear();
        }
        if let Ok(mut progress) = self.progress.lock() {
            progress.clear();
        }
    }

    /// Running channels with their cursor and next send time.
    pub fn snapshot(&self) -> Vec<BroadcastChannelSchedule> {
        let mut all: Vec<_> = self
            .progress
            .lock()
            .map(|p| p.values().cloned().collect())
            .unwrap_or_default();
        all.sort_by(|a, b| a.channel.cmp(&b.channel));
        all
    }

    fn arm(&self, schedule: BroadcastChannelSchedule, first: usize) -> ScheduledTask {
        let handle = self.handle.clone();
        let content = self.content.clone();
        let clock = self.clock.clone();
        let progress = self.progress.clone();
        record_progress(
            &progress,
            &schedule,
            first,
            fire_at(clock.now(), schedule.messages[first].interval()),
        );

        ScheduledTask::spawn(async move {
            let mut cursor = first;
            loop {
                let message = &schedule.messages[cursor];
                let Some(interval) = message.interval() else {
                    break;
                };
                tokio::time::sleep(interval).await;
                send(&handle, content.as_ref(), &schedule.channel, message).await;

                let Some(next) = schedule.next_schedulable(cursor + 1) else {
                    break;
                };
                cursor = next;
                let next_fire_at = fire_at(clock.now(), schedule.messages[cursor].interval());
                record_progress(&progress, &schedule, cursor, next_fire_at);
            }
        })
    }
}

fn fire_at(now: DateTime<Utc>, interval: Option<std::time::Duration>) -> Option<DateTime<Utc>> {
    interval
        .and_then(|i| chrono::Duration::from_std(i).ok())
        .map(|d| now + d)
}

fn record_progress(
    progress: &Progress,
    schedule: &BroadcastChannelSchedule,
    cursor: usize,
    next_fire_at: Option<DateTime<Utc>>,
) {
    if let Ok(mut progress) = progress.lock() {
        let entry = progress
            .entry(schedule.channel.clone())
            .or_insert_with(|| schedule.clone());
        entry.cursor = cursor;
        entry.next_fire_at = next_fire_at;
    }
}

async fn send(
    handle: &TransportHandleProvider,
    content: &dyn ContentProvider,
    channel: &str,
    message: &BroadcastMessage,
) {
    let Some(session) = handle.current() else {
        tracing::warn!("No live session; broadcast to {} skipped", channel);
        return;
    };

    let mut payload = OutboundPayload::text(&message.content);
    if let Some(media_ref) = &message.media_ref {
        match content.fetch(media_kind_for(media_ref), media_ref).await {
            Ok(media) => payload.media = Some(media),
            Err(e) => tracing::warn!("Broadcast media for {} unavailable, sending text only: {}", channel, e),
        }
    }

    match session.send(channel, &payload).await {
        Ok(key) => tracing::debug!("Broadcast sent to {} ({})", channel, key),
        Err(e) => tracing::warn!("Broadcast to {} failed: {}", channel, e),
    }
}

/// Guesses the media kind from a reference's file extension.
pub fn media_kind_for(media_ref: &str) -> MediaKind {
    let path = media_ref.split(['?', '#']).next().unwrap_or(media_ref);
    let extension = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" | "jpg" | "jpeg" | "gif" | "webp" => MediaKind::Image,
        "mp4" | "mov" | "webm" | "mkv" => MediaKind::Video,
        _ => MediaKind::Document,
    }
}

#[async_trait]
impl SessionListener for BroadcastScheduler {
    async fn on_active(&self) {
        if let Err(e) = self.restart_all().await {
            tracing::error!("Failed to restart broadcasts: {:#}", e);
        }
    }

    async fn on_terminated(&self) {
        tracing::info!("Session terminated; stopping broadcasts");
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::{FakeContentProvider, FakeSession, ManualClock, MemoryStore};
    use crate::domain::errors::DeliveryError;
    use std::time::Duration;
    use tokio::time::{Instant, sleep};

    const CHANNEL: &str = "!news:example.org";

    struct Harness {
        scheduler: Arc<BroadcastScheduler>,
        session: Arc<FakeSession>,
        store: Arc<MemoryStore>,
        content: Arc<FakeContentProvider>,
    }

    fn harness() -> Harness {
        let store = MemoryStore::new();
        let session = FakeSession::new();
        let handle = TransportHandleProvider::new();
        handle.replace(Some(session.clone()));
        let content = FakeContentProvider::new();
        let scheduler = BroadcastScheduler::new(store.clone(), handle, content.clone(), ManualClock::new());
        Harness {
            scheduler,
            session,
            store,
            content,
        }
    }

    fn minutes(d: Duration) -> u64 {
        (d.as_secs() + 30) / 60
    }

    fn send_minutes(session: &FakeSession, channel: &str, start: Instant) -> Vec<(u64, String)> {
        session
            .sent_payloads()
            .into_iter()
            .filter(|(to, _, _)| to == channel)
            .map(|(_, payload, at)| (minutes(at - start), payload.text))
            .collect()
    }

    #[tokio::test]
    async fn seeding_keeps_stored_rotations() {
        let h = harness();
        h.store.seed_schedule(BroadcastChannelSchedule::new(
            CHANNEL,
            vec![BroadcastMessage::every_minutes("stored", 5)],
        ));
        let seeds = HashMap::from([
            (CHANNEL.to_string(), vec![BroadcastMessage::every_minutes("from config", 5)]),
            ("!promo:example.org".to_string(), vec![BroadcastMessage::every_minutes("promo", 60)]),
        ]);

        assert_eq!(h.scheduler.seed(&seeds).await.unwrap(), 1);
        assert_eq!(h.store.schedule(CHANNEL).unwrap().messages[0].content, "stored");
        assert_eq!(
            h.store.schedule("!promo:example.org").unwrap().messages[0].content,
            "promo"
        );
        assert_eq!(h.scheduler.seed(&seeds).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn concurrent_reconfigurations_keep_every_channel() {
        let h = harness();
        const PROMO: &str = "!promo:example.org";
        h.store.delay_schedule_loads([Duration::from_secs(2), Duration::from_secs(1)]);

        let (news, promo) = tokio::join!(
            h.scheduler
                .configure(CHANNEL, vec![BroadcastMessage::every_minutes("news", 10)]),
            h.scheduler
                .configure(PROMO, vec![BroadcastMessage::every_minutes("promo", 10)]),
        );
        news.unwrap();
        promo.unwrap();
        sleep(Duration::from_secs(5)).await;

        let running: Vec<_> = h.scheduler.snapshot().into_iter().map(|s| s.channel).collect();
        assert_eq!(running, vec![CHANNEL.to_string(), PROMO.to_string()]);

        sleep(Duration::from_secs(10 * 60)).await;
        let mut texts = h.session.sent_texts();
        texts.sort();
        assert_eq!(
            texts,
            vec![
                (CHANNEL.to_string(), "news".to_string()),
                (PROMO.to_string(), "promo".to_string()),
            ]
        );
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn rotation_waits_each_messages_own_interval() {
        let h = harness();
        let start = Instant::now();
        h.scheduler
            .configure(
                CHANNEL,
                vec![
                    BroadcastMessage::every_minutes("A", 10),
                    BroadcastMessage::every_minutes("B", 20),
                ],
            )
            .await
            .unwrap();

        sleep(Duration::from_secs(1)).await;
        assert!(h.session.sent_texts().is_empty());

        sleep(Duration::from_secs(45 * 60)).await;
        assert_eq!(
            send_minutes(&h.session, CHANNEL, start),
            vec![(10, "A".to_string()), (30, "B".to_string()), (40, "A".to_string())]
        );
        assert_eq!(h.store.schedule(CHANNEL).map(|s| s.messages.len()), Some(2));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn disabled_and_intervalless_messages_are_skipped() {
        let h = harness();
        let start = Instant::now();
        let mut disabled = BroadcastMessage::every_minutes("off", 1);
        disabled.enabled = false;
        h.scheduler
            .configure(
                CHANNEL,
                vec![
                    BroadcastMessage::every_minutes("A", 10),
                    disabled,
                    BroadcastMessage::every_minutes("never", 0),
                    BroadcastMessage::every_minutes("C", 5),
                ],
            )
            .await
            .unwrap();

        sleep(Duration::from_secs(26 * 60)).await;
        assert_eq!(
            send_minutes(&h.session, CHANNEL, start),
            vec![(10, "A".to_string()), (15, "C".to_string()), (25, "A".to_string())]
        );
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn failed_send_still_advances_the_rotation() {
        let h = harness();
        h.session.fail_sends([DeliveryError::Transient("reset".into())]);
        h.scheduler
            .configure(
                CHANNEL,
                vec![
                    BroadcastMessage::every_minutes("A", 10),
                    BroadcastMessage::every_minutes("B", 20),
                ],
            )
            .await
            .unwrap();

        sleep(Duration::from_secs(35 * 60)).await;
        assert_eq!(h.session.send_attempts(), 2);
        assert_eq!(h.session.sent_to(CHANNEL), vec!["B"]);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn reconfiguring_one_channel_restarts_all() {
        let h = harness();
        let start = Instant::now();
        h.scheduler
            .configure("!a:x", vec![BroadcastMessage::every_minutes("A", 10)])
            .await
            .unwrap();
        h.scheduler
            .configure("!b:x", vec![BroadcastMessage::every_minutes("B", 10)])
            .await
            .unwrap();

        sleep(Duration::from_secs(5 * 60)).await;
        h.scheduler
            .configure("!a:x", vec![BroadcastMessage::every_minutes("A2", 20)])
            .await
            .unwrap();
        sleep(Duration::from_secs(21 * 60)).await;

        assert_eq!(
            send_minutes(&h.session, "!b:x", start),
            vec![(15, "B".to_string()), (25, "B".to_string())]
        );
        assert_eq!(send_minutes(&h.session, "!a:x", start), vec![(25, "A2".to_string())]);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn media_is_attached_or_dropped_on_lookup_failure() {
        let h = harness();
        let mut with_media = BroadcastMessage::every_minutes("menu", 10);
        with_media.media_ref = Some("https://cdn.example.org/menu.PNG".into());
        h.scheduler.configure(CHANNEL, vec![with_media]).await.unwrap();

        sleep(Duration::from_secs(10 * 60 + 1)).await;
        h.content.fail();
        sleep(Duration::from_secs(10 * 60)).await;

        let payloads = h.session.sent_payloads();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].1.media.as_ref().map(|m| m.kind), Some(MediaKind::Image));
        assert_eq!(payloads[1].1.media, None);
        assert_eq!(payloads[1].1.text, "menu");
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn termination_stops_and_activation_restarts() {
        let h = harness();
        h.store.seed_schedule(BroadcastChannelSchedule::new(
            CHANNEL,
            vec![BroadcastMessage::every_minutes("A", 10)],
        ));

        h.scheduler.on_active().await;
        assert_eq!(h.scheduler.snapshot().len(), 1);
        assert_eq!(h.scheduler.snapshot()[0].cursor, 0);
        assert!(h.scheduler.snapshot()[0].next_fire_at.is_some());

        h.scheduler.on_terminated().await;
        assert!(h.scheduler.snapshot().is_empty());
        sleep(Duration::from_secs(30 * 60)).await;
        assert!(h.session.sent_texts().is_empty());

        h.scheduler.on_active().await;
        sleep(Duration::from_secs(10 * 60 + 1)).await;
        assert_eq!(h.session.sent_to(CHANNEL), vec!["A"]);
    }

    #[test]
    fn media_kind_follows_extension() {
        assert_eq!(media_kind_for("https://x/a.jpg?size=2"), MediaKind::Image);
        assert_eq!(media_kind_for("clip.MP4"), MediaKind::Video);
        assert_eq!(media_kind_for("brochure.pdf"), MediaKind::Document);
        assert_eq!(media_kind_for("no-extension"), MediaKind::Document);
    }
}
