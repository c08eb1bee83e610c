//! # Bot Module
//!
//! Discord command surface for the jukebox scheduler.
//!
//! This module contains:
//! - Slash command registration and handling
//! - Player button handling (see [`crate::ui::buttons`])
//! - Event handling (ready, interactions, voice state updates)
//! - The announcer that turns [`SessionEvent`]s into channel messages
//!
//! ## Architecture
//!
//! [`JukeboxBot`] implements Serenity's [`EventHandler`] trait. It owns a
//! [`Scheduler`] and translates every interaction into one scheduler call;
//! nothing here waits for audio to finish.
//!
//! [`SessionEvent`]: crate::audio::player::SessionEvent

use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;

use crate::{
    audio::{player::Scheduler, reaper::IdleReaper},
    config::Config,
};

/// Main Discord bot handler.
///
/// ## Fields
///
/// - `config`: Bot configuration (token, limits, sources)
/// - `scheduler`: Per-guild playback scheduler
/// - `announce_channels`: Text channel per guild where player messages go
pub struct JukeboxBot {
    config: Arc<Config>,
    pub scheduler: Scheduler,
    /// Último canal de texto donde se usó `/play` en cada guild
    pub announce_channels: Arc<DashMap<GuildId, ChannelId>>,
    shutdown: CancellationToken,
    tasks_started: AtomicBool,
}

impl JukeboxBot {
    pub fn new(config: Config, scheduler: Scheduler, shutdown: CancellationToken) -> Self {
        Self {
            config: Arc::new(config),
            scheduler,
            announce_channels: Arc::new(DashMap::new()),
            shutdown,
            tasks_started: AtomicBool::new(false),
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Per-guild registration when `GUILD_ID` is set (fast propagation,
    /// useful for development), global otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica el permiso 'applications.commands'.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica el permiso 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Reaper y anunciador; solo una vez aunque `ready` se repita tras reconectar
    fn start_background_tasks(&self, ctx: &Context) {
        if self.tasks_started.swap(true, Ordering::SeqCst) {
            return;
        }

        IdleReaper::new(self.scheduler.clone(), self.config.idle_check_interval)
            .spawn(self.shutdown.clone());

        tokio::spawn(events::run_announcer(
            ctx.http.clone(),
            self.scheduler.subscribe(),
            self.announce_channels.clone(),
            self.shutdown.clone(),
        ));
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    /// Called when the bot is ready and connected to Discord.
    ///
    /// Registers commands and starts the idle reaper and the announcer.
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        self.start_background_tasks(&ctx);
    }

    /// Handles slash commands and player buttons.
    ///
    /// Errors are logged but don't crash the bot.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await
                {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Resets the session when the bot is removed from voice from outside
    /// (kicked, moved to nothing, channel deleted).
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            info!("🔌 Bot desconectado en guild {}", guild_id);
            self.scheduler.evicted(guild_id).await;
        }
    }
}
