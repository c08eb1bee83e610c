use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use jukebox::{
    audio::{player::Scheduler, songbird_voice::SongbirdTransport},
    bot::JukeboxBot,
    config::Config,
    sources::SourceManager,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let songbird = Songbird::serenity();
    let shutdown = CancellationToken::new();

    let resolver = Arc::new(SourceManager::new(&config));
    let transport = Arc::new(SongbirdTransport::new(songbird.clone()));
    let scheduler = Scheduler::new(resolver, transport.clone(), config.playback_policy());

    let handler = JukeboxBot::new(config.clone(), scheduler, shutdown.clone());

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // La ocupación de canales se lee del cache del cliente
    transport.attach_cache(client.cache.clone());

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shutdown.cancel();
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .kill_on_drop(true)
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
