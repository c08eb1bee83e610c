use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    bot::JukeboxBot,
    error::{PlaybackError, PlaybackResult},
    ui::{buttons, embeds},
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, guild_id, bot).await?,
        "join" => handle_join(ctx, &command, guild_id, bot).await?,
        "pause" => {
            let result = bot.scheduler.pause(guild_id).await.map(|()| {
                embeds::create_success_embed("Pausado", "⏸️ Reproducción pausada")
            });
            respond(ctx, &command, result).await?
        }
        "resume" => {
            let result = bot.scheduler.resume(guild_id).await.map(|()| {
                embeds::create_success_embed("Reanudado", "▶️ Reproducción reanudada")
            });
            respond(ctx, &command, result).await?
        }
        "skip" => {
            let result = bot.scheduler.skip(guild_id).await.map(|remaining| {
                embeds::create_success_embed(
                    "Canción Saltada",
                    &format!("⏭️ Quedan **{}** canciones en la cola", remaining),
                )
            });
            respond(ctx, &command, result).await?
        }
        "stop" => {
            let result = bot.scheduler.stop(guild_id).await.map(|()| {
                embeds::create_success_embed(
                    "Reproducción Detenida",
                    "⏹️ Cola vaciada. Sigo en el canal por si quieres más música",
                )
            });
            respond(ctx, &command, result).await?
        }
        "leave" => {
            let result = bot.scheduler.leave(guild_id).await.map(|()| {
                bot.announce_channels.remove(&guild_id);
                embeds::create_success_embed("Desconectado", "👋 Hasta la próxima")
            });
            respond(ctx, &command, result).await?
        }
        "queue" => {
            let page = command
                .data
                .options
                .iter()
                .find(|opt| opt.name == "page")
                .and_then(|opt| opt.value.as_i64())
                .map_or(1, |p| p.max(1) as usize);
            let snapshot = bot.scheduler.snapshot(guild_id);
            respond(ctx, &command, Ok(embeds::create_queue_embed(&snapshot, page))).await?
        }
        _ => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ Comando no reconocido")
                            .ephemeral(true),
                    ),
                )
                .await?;
        }
    }

    Ok(())
}

/// Maneja interacciones con componentes (botones del reproductor)
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    buttons::handle_music_component(ctx, &component, bot).await
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &JukeboxBot,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    // Defer la respuesta ya que yt-dlp puede tardar
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let voice_channel = get_user_voice_channel(ctx, guild_id, command.user.id);

    let embed = match bot
        .scheduler
        .play(guild_id, voice_channel, query, command.user.id)
        .await
    {
        Ok(queued) => {
            bot.announce_channels.insert(guild_id, command.channel_id);
            embeds::create_track_added_embed(&queued)
        }
        Err(e) => {
            warn!("/play rechazado en guild {}: {}", guild_id, e);
            embeds::create_playback_error_embed(&e)
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &JukeboxBot,
) -> Result<()> {
    let result = match get_user_voice_channel(ctx, guild_id, command.user.id) {
        Some(channel_id) => bot.scheduler.join(guild_id, channel_id).await.map(|()| {
            bot.announce_channels.insert(guild_id, command.channel_id);
            embeds::create_success_embed("Conectado", &format!("🔊 Conectado a <#{}>", channel_id))
        }),
        None => Err(PlaybackError::NotInVoiceChannel),
    };

    respond(ctx, command, result).await
}

/// Responde con el embed o con el error renderizado (solo visible para quien
/// invocó el comando)
async fn respond(
    ctx: &Context,
    command: &CommandInteraction,
    result: PlaybackResult<CreateEmbed>,
) -> Result<()> {
    let message = match result {
        Ok(embed) => CreateInteractionResponseMessage::new().embed(embed),
        Err(e) => CreateInteractionResponseMessage::new()
            .embed(embeds::create_playback_error_embed(&e))
            .ephemeral(true),
    };

    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;

    Ok(())
}

/// Canal de voz del usuario según el cache
fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
