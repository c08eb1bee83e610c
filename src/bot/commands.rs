use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        join_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        stop_command(),
        leave_command(),
        queue_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción (URL, link de Spotify o búsqueda)")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
}

// Comandos de control

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción y limpia la cola")
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Página de la cola")
                .min_int_value(1),
        )
}

// Comandos de conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Conecta el bot a tu canal de voz")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot del canal de voz")
}
