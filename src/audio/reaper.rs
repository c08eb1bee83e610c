use futures::future::join_all;
use std::time::Duration;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{player::Scheduler, voice::human_occupants};

const OCCUPANCY_TIMEOUT: Duration = Duration::from_secs(5);

/// Tarea periódica que libera conexiones de voz sin oyentes humanos.
///
/// Cada barrido consulta la ocupación de todas las sesiones conectadas en
/// paralelo; un fallo en una guild se registra y no corta el barrido.
pub struct IdleReaper {
    scheduler: Scheduler,
    interval: Duration,
    occupancy_timeout: Duration,
}

impl IdleReaper {
    pub fn new(scheduler: Scheduler, interval: Duration) -> Self {
        Self {
            scheduler,
            interval,
            occupancy_timeout: OCCUPANCY_TIMEOUT.min(interval),
        }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!("🧹 Reaper de inactividad cada {:?}", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // El primer tick es inmediato
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Reaper detenido");
                    break;
                }
                _ = ticker.tick() => {
                    let reaped = self.sweep().await;
                    if reaped > 0 {
                        info!("🧹 {} conexiones inactivas liberadas", reaped);
                    }
                }
            }
        }
    }

    /// Un barrido completo. Devuelve cuántas sesiones se desconectaron.
    pub async fn sweep(&self) -> usize {
        let connected = self.scheduler.connected_sessions();
        trace!("Revisando {} sesiones conectadas", connected.len());

        let checks = connected.into_iter().map(|(guild_id, voice)| async move {
            let occupants = tokio::time::timeout(self.occupancy_timeout, voice.occupants()).await;
            (guild_id, voice, occupants)
        });

        let mut reaped = 0;
        for (guild_id, voice, occupants) in join_all(checks).await {
            match occupants {
                Ok(Ok(occupants)) if human_occupants(&occupants) == 0 => {
                    info!("🚪 Canal vacío en guild {}, desconectando", guild_id);
                    if self.scheduler.reap(guild_id, &voice).await {
                        reaped += 1;
                    }
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    warn!("No se pudo revisar ocupación en guild {}: {}", guild_id, e);
                }
                Err(_) => {
                    warn!("Timeout revisando ocupación en guild {}", guild_id);
                }
            }
        }

        reaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            player::{DisconnectReason, PlaybackPolicy, SessionEvent},
            voice::{MockVoiceHandle, MockVoiceTransport, Occupant, VoiceHandle},
        },
        error::VoiceError,
        sources::MockResolver,
    };
    use serenity::model::id::{ChannelId, GuildId, UserId};
    use std::{collections::HashMap, sync::Arc};

    const BOT: UserId = UserId::new(999);
    const HUMAN: UserId = UserId::new(1);

    fn occupants(humans: usize) -> Vec<Occupant> {
        let mut list = vec![Occupant { user_id: BOT, bot: true }];
        list.extend((0..humans).map(|i| Occupant {
            user_id: UserId::new(HUMAN.get() + i as u64),
            bot: false,
        }));
        list
    }

    fn idle_handle(humans: usize, disconnects: usize) -> MockVoiceHandle {
        let mut handle = MockVoiceHandle::new();
        handle
            .expect_occupants()
            .returning(move || Ok(occupants(humans)));
        handle.expect_disconnect().times(disconnects).returning(|| Ok(()));
        handle
    }

    /// Scheduler con una conexión ya establecida por guild
    async fn scheduler_with(handles: Vec<(GuildId, MockVoiceHandle)>) -> Scheduler {
        let handles: HashMap<GuildId, Arc<dyn VoiceHandle>> = handles
            .into_iter()
            .map(|(guild, handle)| (guild, Arc::new(handle) as Arc<dyn VoiceHandle>))
            .collect();
        let guilds: Vec<GuildId> = handles.keys().copied().collect();

        let mut transport = MockVoiceTransport::new();
        transport
            .expect_connect()
            .returning(move |guild, _| Ok(handles[&guild].clone()));

        let scheduler = Scheduler::new(
            Arc::new(MockResolver::new()),
            Arc::new(transport),
            PlaybackPolicy::default(),
        );
        for guild in guilds {
            scheduler.join(guild, ChannelId::new(10)).await.unwrap();
        }
        scheduler
    }

    #[tokio::test]
    async fn test_sweep_reaps_channel_with_only_bots() {
        let guild = GuildId::new(1);
        let scheduler = scheduler_with(vec![(guild, idle_handle(0, 1))]).await;
        let mut events = scheduler.subscribe();

        let reaper = IdleReaper::new(scheduler.clone(), Duration::from_secs(30));
        assert_eq!(reaper.sweep().await, 1);

        let session = scheduler.session(guild);
        assert!(!session.is_connected());
        assert_eq!(session.queue_len(), 0);

        let mut saw_idle_disconnect = false;
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::Disconnected { reason, .. } = event {
                saw_idle_disconnect = reason == DisconnectReason::Idle;
            }
        }
        assert!(saw_idle_disconnect);
    }

    #[tokio::test]
    async fn test_sweep_keeps_channel_with_listeners() {
        let guild = GuildId::new(1);
        let scheduler = scheduler_with(vec![(guild, idle_handle(1, 0))]).await;

        let reaper = IdleReaper::new(scheduler.clone(), Duration::from_secs(30));
        assert_eq!(reaper.sweep().await, 0);
        assert!(scheduler.session(guild).is_connected());
    }

    #[tokio::test]
    async fn test_occupancy_failure_does_not_abort_sweep() {
        let broken = GuildId::new(1);
        let empty = GuildId::new(2);

        let mut failing = MockVoiceHandle::new();
        failing
            .expect_occupants()
            .returning(|| Err(VoiceError::Transport("gateway caído".into())));
        failing.expect_disconnect().never();

        let scheduler =
            scheduler_with(vec![(broken, failing), (empty, idle_handle(0, 1))]).await;

        let reaper = IdleReaper::new(scheduler.clone(), Duration::from_secs(30));
        assert_eq!(reaper.sweep().await, 1);
        assert!(scheduler.session(broken).is_connected());
        assert!(!scheduler.session(empty).is_connected());
    }

    #[tokio::test]
    async fn test_run_reaps_within_one_interval_and_stops_on_shutdown() {
        let guild = GuildId::new(1);
        let scheduler = scheduler_with(vec![(guild, idle_handle(0, 1))]).await;

        let shutdown = CancellationToken::new();
        let task = IdleReaper::new(scheduler.clone(), Duration::from_millis(20))
            .spawn(shutdown.clone());

        let session = scheduler.session(guild);
        tokio::time::timeout(Duration::from_secs(2), async {
            while session.is_connected() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("el reaper desconecta a tiempo");

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("el reaper termina")
            .unwrap();
    }
}
