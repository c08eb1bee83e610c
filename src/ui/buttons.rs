use anyhow::Result;
use serenity::{
    all::{ButtonStyle, ComponentInteraction, Context},
    builder::{
        CreateActionRow, CreateButton, CreateInteractionResponse,
        CreateInteractionResponseFollowup, CreateInteractionResponseMessage,
    },
};
use tracing::debug;

use crate::{bot::JukeboxBot, error::PlaybackError, ui::embeds};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const PLAY_PAUSE: &str = "music_play_pause";
    pub const SKIP: &str = "music_skip";
    pub const STOP: &str = "music_stop";
}

/// Controles del mensaje "reproduciendo ahora".
/// `disabled` se usa cuando la cola terminó y el mensaje quedó obsoleto.
pub fn create_player_buttons(paused: bool, disabled: bool) -> Vec<CreateActionRow> {
    let (emoji, style) = if paused {
        ('▶', ButtonStyle::Success)
    } else {
        ('⏸', ButtonStyle::Secondary)
    };

    let play_pause_btn = CreateButton::new(button_ids::PLAY_PAUSE)
        .emoji(emoji)
        .style(style)
        .disabled(disabled);

    let skip_btn = CreateButton::new(button_ids::SKIP)
        .emoji('⏭')
        .style(ButtonStyle::Primary)
        .disabled(disabled);

    let stop_btn = CreateButton::new(button_ids::STOP)
        .emoji('⏹')
        .style(ButtonStyle::Danger)
        .disabled(disabled);

    vec![CreateActionRow::Buttons(vec![play_pause_btn, skip_btn, stop_btn])]
}

/// Manejador de interacciones con componentes
pub async fn handle_music_component(
    ctx: &Context,
    interaction: &ComponentInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let scheduler = &bot.scheduler;
    let guild_id = interaction
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("No guild ID"))?;

    match interaction.data.custom_id.as_str() {
        button_ids::PLAY_PAUSE => match scheduler.toggle_pause(guild_id).await {
            Ok(paused) => {
                // Actualiza el mensaje original con el botón invertido
                interaction
                    .create_response(
                        &ctx.http,
                        CreateInteractionResponse::UpdateMessage(
                            CreateInteractionResponseMessage::new()
                                .components(create_player_buttons(paused, false)),
                        ),
                    )
                    .await?;
                let msg = if paused {
                    "⏸️ Música pausada"
                } else {
                    "▶️ Música reanudada"
                };
                update_response(ctx, interaction, msg).await?;
            }
            Err(e) => respond_error(ctx, interaction, &e).await?,
        },
        button_ids::SKIP => {
            interaction.defer(&ctx.http).await?;
            match scheduler.skip(guild_id).await {
                Ok(0) => update_response(ctx, interaction, "⏭️ Saltada. No hay más canciones en la cola").await?,
                Ok(remaining) => {
                    let msg = format!("⏭️ Saltando a la siguiente canción ({} en cola)", remaining);
                    update_response(ctx, interaction, &msg).await?;
                }
                Err(e) => followup_error(ctx, interaction, &e).await?,
            }
        }
        button_ids::STOP => {
            interaction.defer(&ctx.http).await?;
            match scheduler.stop(guild_id).await {
                Ok(()) => update_response(ctx, interaction, "⏹️ Reproducción detenida").await?,
                Err(e) => followup_error(ctx, interaction, &e).await?,
            }
        }
        _ => {
            debug!("Componente no manejado: {}", interaction.data.custom_id);
            interaction
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("⚠️ Función no implementada")
                            .ephemeral(true),
                    ),
                )
                .await?;
        }
    }

    Ok(())
}

/// Actualiza la respuesta de una interacción
async fn update_response(
    ctx: &Context,
    interaction: &ComponentInteraction,
    content: &str,
) -> Result<()> {
    interaction
        .create_followup(
            &ctx.http,
            CreateInteractionResponseFollowup::new()
                .content(content)
                .ephemeral(true),
        )
        .await?;

    Ok(())
}

async fn respond_error(
    ctx: &Context,
    interaction: &ComponentInteraction,
    error: &PlaybackError,
) -> Result<()> {
    interaction
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embeds::create_playback_error_embed(error))
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

async fn followup_error(
    ctx: &Context,
    interaction: &ComponentInteraction,
    error: &PlaybackError,
) -> Result<()> {
    interaction
        .create_followup(
            &ctx.http,
            CreateInteractionResponseFollowup::new()
                .embed(embeds::create_playback_error_embed(error))
                .ephemeral(true),
        )
        .await?;
    Ok(())
}
