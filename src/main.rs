use dotenvy::dotenv;
use gemini_chat_bot::access::AccessRegistry;
use gemini_chat_bot::bot::telegram::{
    get_user_id_safe, photo_refs, register_commands, Command,
};
use gemini_chat_bot::bot::{AdminStateTable, Router, TelegramTransport};
use gemini_chat_bot::config::Settings;
use gemini_chat_bot::conversation::ConversationDriver;
use gemini_chat_bot::llm::{GeminiProvider, GenerativeBackend};
use gemini_chat_bot::logging::{init_logging, RedactionPatterns};
use gemini_chat_bot::storage::{self, StorageProvider};
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    // Initialize redaction patterns early (before logging)
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);
    init_logging(patterns);

    info!("Starting Gemini chat bot...");

    let settings = init_settings();
    let storage = init_storage(&settings).await;
    let backend = init_backend(&settings);

    let admins = settings.admin_ids();
    if admins.is_empty() {
        warn!("No admin IDs configured; the allow-list can not be managed.");
    } else {
        info!("Loaded {} admin ID(s).", admins.len());
    }

    let registry = Arc::new(AccessRegistry::new(admins, storage.clone()));
    let driver = Arc::new(ConversationDriver::from_settings(
        &settings, storage, backend,
    ));
    let router = Arc::new(Router::new(
        registry,
        Arc::new(AdminStateTable::new()),
        driver,
        settings.downloads_path(),
    ));

    let bot = Bot::new(settings.telegram_bot_token.clone());
    if let Err(e) = register_commands(&bot).await {
        warn!("Failed to register bot commands: {e}");
    }

    info!("Bot is running...");

    Dispatcher::builder(bot, setup_handler())
        .dependencies(dptree::deps![router])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

async fn init_storage(settings: &Settings) -> Arc<dyn StorageProvider> {
    if !settings.r2_configured() {
        warn!("R2 is not configured; users, allow-list and history are kept in memory only.");
        return Arc::new(storage::InMemoryStorage::new());
    }

    match storage::R2Storage::new(settings).await {
        Ok(s) => {
            info!("R2 Storage initialized.");
            if let Err(e) = s.check_connection().await {
                error!("R2 Storage connection check returned error: {e}");
            }
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to initialize R2 Storage: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_backend(settings: &Settings) -> Arc<dyn GenerativeBackend> {
    match GeminiProvider::new(settings.gemini_token.clone()) {
        Ok(provider) => {
            info!(
                "Gemini backend initialized (chat: {}, media: {}).",
                settings.chat_model, settings.media_model
            );
            Arc::new(provider)
        }
        Err(e) => {
            error!("Failed to initialize Gemini backend: {}", e);
            std::process::exit(1);
        }
    }
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handle_callback))
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(dptree::filter(|msg: Message| msg.text().is_some()).endpoint(handle_text))
                .branch(
                    dptree::filter(|msg: Message| msg.photo().is_some()).endpoint(handle_photo),
                )
                .branch(
                    dptree::filter(|msg: Message| msg.voice().is_some()).endpoint(handle_voice),
                ),
        )
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    router: Arc<Router>,
) -> Result<(), teloxide::RequestError> {
    let transport = TelegramTransport::new(bot, msg.chat.id);
    let user_id = get_user_id_safe(&msg);
    let res = match cmd {
        Command::Start => router.on_start(&transport, user_id).await,
        Command::Admin => router.on_admin_command(&transport, user_id).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    router: Arc<Router>,
) -> Result<(), teloxide::RequestError> {
    let transport = TelegramTransport::for_callback(bot, &q);
    let user_id = q.from.id.0.cast_signed();
    let data = q.data.as_deref().unwrap_or_default();
    if let Err(e) = router.on_callback(&transport, user_id, data).await {
        error!("Callback handler error: {}", e);
    }
    respond(())
}

async fn handle_text(
    bot: Bot,
    msg: Message,
    router: Arc<Router>,
) -> Result<(), teloxide::RequestError> {
    let transport = TelegramTransport::new(bot, msg.chat.id);
    let text = msg.text().unwrap_or_default();
    if let Err(e) = router
        .on_text(&transport, get_user_id_safe(&msg), text)
        .await
    {
        error!("Text handler error: {}", e);
    }
    respond(())
}

async fn handle_photo(
    bot: Bot,
    msg: Message,
    router: Arc<Router>,
) -> Result<(), teloxide::RequestError> {
    let transport = TelegramTransport::new(bot, msg.chat.id);
    let photos = photo_refs(msg.photo().unwrap_or_default());
    if let Err(e) = router
        .on_photo(&transport, get_user_id_safe(&msg), &photos, msg.caption())
        .await
    {
        error!("Photo handler error: {}", e);
    }
    respond(())
}

async fn handle_voice(
    bot: Bot,
    msg: Message,
    router: Arc<Router>,
) -> Result<(), teloxide::RequestError> {
    let Some(voice) = msg.voice() else {
        return respond(());
    };
    let transport = TelegramTransport::new(bot, msg.chat.id);
    if let Err(e) = router
        .on_voice(&transport, get_user_id_safe(&msg), &voice.file.id.0)
        .await
    {
        error!("Voice handler error: {}", e);
    }
    respond(())
}
