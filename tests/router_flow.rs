use anyhow::Result;
use async_trait::async_trait;
use gemini_chat_bot::access::AccessRegistry;
use gemini_chat_bot::bot::views;
use gemini_chat_bot::bot::{AdminAction, AdminStateTable, ChatTransport, Router, TextFormat};
use gemini_chat_bot::conversation::{
    ConversationDriver, PHOTO_ERROR_REPLY, TEXT_ERROR_REPLY, VOICE_ERROR_REPLY,
};
use gemini_chat_bot::llm::{ChatTurn, GenerativeBackend, LlmError, UploadedFile};
use gemini_chat_bot::media::PhotoRef;
use gemini_chat_bot::storage::{
    HistoryWindow, InMemoryStorage, MessageRole, RemoveOutcome, StorageError, StorageProvider,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const ADMIN: i64 = 100;
const GUEST: i64 = 200;

/// Outbound event captured by [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
enum Sent {
    Text(String, TextFormat),
    AdminPanel,
    CallbackAnswer(Option<String>),
    Typing,
}

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    file: Vec<u8>,
}

impl RecordingTransport {
    fn with_file(bytes: &[u8]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            file: bytes.to_vec(),
        }
    }

    fn record(&self, event: Sent) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(event);
        }
    }

    fn events(&self) -> Vec<Sent> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn texts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Sent::Text(text, _) => Some(text),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_text(&self, text: &str, format: TextFormat) -> Result<()> {
        self.record(Sent::Text(text.to_string(), format));
        Ok(())
    }

    async fn send_admin_panel(&self) -> Result<()> {
        self.record(Sent::AdminPanel);
        Ok(())
    }

    async fn answer_callback(&self, text: Option<&str>) -> Result<()> {
        self.record(Sent::CallbackAnswer(text.map(ToString::to_string)));
        Ok(())
    }

    async fn send_typing(&self) -> Result<()> {
        self.record(Sent::Typing);
        Ok(())
    }

    async fn fetch_file(&self, _file_id: &str) -> Result<Vec<u8>> {
        Ok(self.file.clone())
    }
}

/// Backend returning a fixed reply and counting calls
struct FixedBackend {
    reply: String,
    chat_calls: AtomicUsize,
    last_history_len: AtomicUsize,
    uploads: Mutex<Vec<PathBuf>>,
}

impl FixedBackend {
    fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            chat_calls: AtomicUsize::new(0),
            last_history_len: AtomicUsize::new(0),
            uploads: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl GenerativeBackend for FixedBackend {
    async fn chat(
        &self,
        history: &[ChatTurn],
        _user_message: &str,
        _model_id: &str,
    ) -> Result<String, LlmError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        self.last_history_len.store(history.len(), Ordering::SeqCst);
        Ok(self.reply.clone())
    }

    async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<UploadedFile, LlmError> {
        if !path.exists() {
            return Err(LlmError::UploadError("file missing".to_string()));
        }
        if let Ok(mut uploads) = self.uploads.lock() {
            uploads.push(path.to_path_buf());
        }
        Ok(UploadedFile {
            uri: "files/test".to_string(),
            mime_type: mime_type.to_string(),
        })
    }

    async fn generate_with_file(
        &self,
        _file: &UploadedFile,
        prompt: &str,
        _model_id: &str,
    ) -> Result<String, LlmError> {
        Ok(format!("{}: {prompt}", self.reply))
    }
}

struct Harness {
    router: Router,
    storage: Arc<InMemoryStorage>,
    backend: Arc<FixedBackend>,
    _downloads: tempfile::TempDir,
}

fn harness(reply: &str) -> Result<Harness> {
    let downloads = tempfile::tempdir()?;
    let storage = Arc::new(InMemoryStorage::new());
    let backend = Arc::new(FixedBackend::new(reply));
    let registry = Arc::new(AccessRegistry::new(
        HashSet::from([ADMIN]),
        storage.clone(),
    ));
    let driver = Arc::new(ConversationDriver::new(
        storage.clone(),
        backend.clone(),
        "chat",
        "media",
    ));
    let router = Router::new(
        registry,
        Arc::new(AdminStateTable::new()),
        driver,
        downloads.path().join("media"),
    );
    Ok(Harness {
        router,
        storage,
        backend,
        _downloads: downloads,
    })
}

/// Store whose every call fails, as when R2 is unreachable
struct UnreachableStorage;

fn unreachable() -> StorageError {
    StorageError::Config("down".to_string())
}

#[async_trait]
impl StorageProvider for UnreachableStorage {
    async fn ensure_user(&self, _user_id: i64) -> Result<bool, StorageError> {
        Err(unreachable())
    }
    async fn is_allowed_user(&self, _user_id: i64) -> Result<bool, StorageError> {
        Err(unreachable())
    }
    async fn upsert_allowed_user(&self, _user_id: i64) -> Result<(), StorageError> {
        Err(unreachable())
    }
    async fn delete_allowed_user(&self, _user_id: i64) -> Result<RemoveOutcome, StorageError> {
        Err(unreachable())
    }
    async fn list_allowed_users(&self) -> Result<Vec<i64>, StorageError> {
        Err(unreachable())
    }
    async fn load_history_window(
        &self,
        _user_id: i64,
        _cap: usize,
    ) -> Result<HistoryWindow, StorageError> {
        Err(unreachable())
    }
    async fn append_turn(
        &self,
        _user_id: i64,
        _user_content: String,
        _model_content: String,
    ) -> Result<(), StorageError> {
        Err(unreachable())
    }
    async fn message_count(&self, _user_id: i64) -> Result<usize, StorageError> {
        Err(unreachable())
    }
    async fn check_connection(&self) -> Result<(), String> {
        Err("down".to_string())
    }
}

fn router_over_unreachable_store(downloads: &Path) -> (Router, Arc<FixedBackend>) {
    let storage: Arc<dyn StorageProvider> = Arc::new(UnreachableStorage);
    let backend = Arc::new(FixedBackend::new("unused"));
    let registry = Arc::new(AccessRegistry::new(HashSet::from([ADMIN]), storage.clone()));
    let driver = Arc::new(ConversationDriver::new(
        storage,
        backend.clone(),
        "chat",
        "media",
    ));
    let router = Router::new(
        registry,
        Arc::new(AdminStateTable::new()),
        driver,
        downloads.join("media"),
    );
    (router, backend)
}

#[tokio::test]
async fn unknown_user_is_denied_without_backend_call() -> Result<()> {
    let h = harness("hi")?;
    let transport = RecordingTransport::default();

    h.router.on_text(&transport, GUEST, "hello").await?;
    h.router.on_start(&transport, GUEST).await?;

    assert_eq!(
        transport.texts(),
        vec![views::ACCESS_DENIED, views::ACCESS_DENIED]
    );
    assert_eq!(h.backend.chat_calls.load(Ordering::SeqCst), 0);
    assert!(!h.storage.has_user(GUEST).await);
    Ok(())
}

#[tokio::test]
async fn admin_add_flow_survives_invalid_input() -> Result<()> {
    let h = harness("answer")?;
    let transport = RecordingTransport::default();

    h.router
        .on_callback(&transport, ADMIN, views::CALLBACK_ADD_USER)
        .await?;
    assert_eq!(
        h.router.admin_state().pending(ADMIN).await,
        Some(AdminAction::AddUser)
    );

    h.router.on_text(&transport, ADMIN, "not a number").await?;
    assert_eq!(
        h.router.admin_state().pending(ADMIN).await,
        Some(AdminAction::AddUser)
    );

    h.router.on_text(&transport, ADMIN, &GUEST.to_string()).await?;
    assert_eq!(h.router.admin_state().pending(ADMIN).await, None);
    assert!(h.storage.is_allowed_user(GUEST).await?);

    assert_eq!(
        transport.events(),
        vec![
            Sent::CallbackAnswer(None),
            Sent::Text(views::ASK_ADD_ID.to_string(), TextFormat::Plain),
            Sent::Text(views::INVALID_ID.to_string(), TextFormat::Plain),
            Sent::Text(views::user_added(GUEST), TextFormat::Plain),
        ]
    );
    assert_eq!(h.backend.chat_calls.load(Ordering::SeqCst), 0);

    // Newly allowed user can now talk to the bot
    let guest = RecordingTransport::default();
    h.router.on_text(&guest, GUEST, "hello").await?;
    assert_eq!(h.backend.chat_calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn admin_remove_flow_revokes_access() -> Result<()> {
    let h = harness("answer")?;
    h.storage.upsert_allowed_user(GUEST).await?;
    let transport = RecordingTransport::default();

    h.router
        .on_callback(&transport, ADMIN, views::CALLBACK_REMOVE_USER)
        .await?;
    h.router.on_text(&transport, ADMIN, "200").await?;

    h.router
        .on_callback(&transport, ADMIN, views::CALLBACK_REMOVE_USER)
        .await?;
    h.router.on_text(&transport, ADMIN, "200").await?;

    let texts = transport.texts();
    assert!(texts.contains(&views::user_removed(GUEST)));
    assert_eq!(texts.last(), Some(&views::user_not_found(GUEST)));
    assert!(!h.storage.is_allowed_user(GUEST).await?);

    let guest = RecordingTransport::default();
    h.router.on_text(&guest, GUEST, "hi").await?;
    assert_eq!(guest.texts(), vec![views::ACCESS_DENIED]);
    Ok(())
}

#[tokio::test]
async fn non_admin_admin_command_creates_no_state() -> Result<()> {
    let h = harness("x")?;
    h.storage.upsert_allowed_user(GUEST).await?;
    let transport = RecordingTransport::default();

    h.router.on_admin_command(&transport, GUEST).await?;
    h.router
        .on_callback(&transport, GUEST, views::CALLBACK_ADD_USER)
        .await?;

    assert_eq!(
        transport.events(),
        vec![
            Sent::Text(views::NOT_ADMIN.to_string(), TextFormat::Plain),
            Sent::CallbackAnswer(Some(views::NOT_ADMIN.to_string())),
        ]
    );
    assert!(h.router.admin_state().is_empty().await);
    Ok(())
}

#[tokio::test]
async fn admin_gets_panel_and_user_list() -> Result<()> {
    let h = harness("x")?;
    h.storage.upsert_allowed_user(7).await?;
    h.storage.upsert_allowed_user(3).await?;
    let transport = RecordingTransport::default();

    h.router.on_admin_command(&transport, ADMIN).await?;
    h.router
        .on_callback(&transport, ADMIN, views::CALLBACK_LIST_USERS)
        .await?;

    assert_eq!(
        transport.events(),
        vec![
            Sent::AdminPanel,
            Sent::CallbackAnswer(None),
            Sent::Text(views::allowed_users_list(&[3, 7]), TextFormat::Plain),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn long_reply_is_sent_in_two_chunks() -> Result<()> {
    let h = harness(&"a".repeat(5000))?;
    let transport = RecordingTransport::default();

    h.router.on_text(&transport, ADMIN, "write a lot").await?;

    let events = transport.events();
    assert_eq!(events[0], Sent::Text(views::WAIT_TEXT.to_string(), TextFormat::Plain));
    assert_eq!(events[1], Sent::Typing);
    let chunk_lengths: Vec<usize> = events[2..]
        .iter()
        .filter_map(|e| match e {
            Sent::Text(text, TextFormat::MarkdownV2) => Some(text.chars().count()),
            _ => None,
        })
        .collect();
    assert_eq!(chunk_lengths, vec![4096, 904]);
    Ok(())
}

#[tokio::test]
async fn history_is_capped_then_grows_by_one_turn() -> Result<()> {
    let h = harness("reply")?;
    for i in 0..250 {
        let role = if i % 2 == 0 {
            MessageRole::User
        } else {
            MessageRole::Model
        };
        h.storage.insert_message(ADMIN, role, format!("m{i}")).await;
    }
    let transport = RecordingTransport::default();

    h.router.on_text(&transport, ADMIN, "next").await?;

    assert_eq!(h.backend.last_history_len.load(Ordering::SeqCst), 200);
    assert_eq!(h.storage.message_count(ADMIN).await?, 202);
    let history = h.storage.history(ADMIN).await;
    assert_eq!(history.messages[0].content, "m50");
    Ok(())
}

#[tokio::test]
async fn failed_turn_write_stores_nothing_and_reports_error() -> Result<()> {
    let h = harness("reply")?;
    h.storage.fail_next_turn_at(2);
    let transport = RecordingTransport::default();

    h.router.on_text(&transport, ADMIN, "question").await?;

    assert_eq!(h.storage.message_count(ADMIN).await?, 0);
    assert_eq!(
        transport.texts().last().map(String::as_str),
        Some(TEXT_ERROR_REPLY)
    );
    Ok(())
}

#[tokio::test]
async fn photo_is_downloaded_answered_and_deleted() -> Result<()> {
    let h = harness("seen")?;
    let transport = RecordingTransport::with_file(b"jpeg-bytes");
    let photos = vec![
        PhotoRef {
            file_id: "small".to_string(),
            width: 90,
            height: 90,
            file_size: 900,
        },
        PhotoRef {
            file_id: "large".to_string(),
            width: 1280,
            height: 1280,
            file_size: 120_000,
        },
        PhotoRef {
            file_id: "medium".to_string(),
            width: 320,
            height: 320,
            file_size: 9_000,
        },
    ];

    h.router
        .on_photo(&transport, ADMIN, &photos, Some("what is it?"))
        .await?;

    let uploads = h.backend.uploads.lock().map(|u| u.clone()).unwrap_or_default();
    assert_eq!(uploads.len(), 1);
    assert!(uploads[0].ends_with("large.jpg"));
    assert!(!uploads[0].exists());
    assert_eq!(
        transport.texts(),
        vec![views::WAIT_PHOTO.to_string(), "seen: what is it?".to_string()]
    );
    assert_eq!(h.storage.message_count(ADMIN).await?, 0);
    Ok(())
}

#[tokio::test]
async fn voice_is_answered_with_fixed_prompt() -> Result<()> {
    let h = harness("heard")?;
    h.storage.upsert_allowed_user(GUEST).await?;
    let transport = RecordingTransport::with_file(b"ogg-bytes");

    h.router.on_voice(&transport, GUEST, "voice-1").await?;

    let uploads = h.backend.uploads.lock().map(|u| u.clone()).unwrap_or_default();
    assert_eq!(uploads.len(), 1);
    assert!(uploads[0].ends_with("voice-1.ogg"));
    assert!(!uploads[0].exists());
    assert_eq!(
        transport.texts(),
        vec![format!(
            "heard: {}",
            gemini_chat_bot::config::VOICE_PROMPT
        )]
    );
    Ok(())
}

#[tokio::test]
async fn unreadable_allow_list_gets_error_reply() -> Result<()> {
    let downloads = tempfile::tempdir()?;
    let (router, backend) = router_over_unreachable_store(downloads.path());
    let photo = PhotoRef {
        file_id: "p".to_string(),
        width: 10,
        height: 10,
        file_size: 100,
    };

    let text = RecordingTransport::default();
    router.on_text(&text, 555, "hello").await?;
    assert_eq!(text.texts(), vec![TEXT_ERROR_REPLY]);

    let start = RecordingTransport::default();
    router.on_start(&start, 555).await?;
    assert_eq!(start.texts(), vec![TEXT_ERROR_REPLY]);

    let photo_chat = RecordingTransport::with_file(b"jpeg");
    router.on_photo(&photo_chat, 555, &[photo], None).await?;
    assert_eq!(photo_chat.texts(), vec![PHOTO_ERROR_REPLY]);

    let voice_chat = RecordingTransport::with_file(b"ogg");
    router.on_voice(&voice_chat, 555, "v").await?;
    assert_eq!(voice_chat.texts(), vec![VOICE_ERROR_REPLY]);

    assert_eq!(backend.chat_calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn photo_without_sizes_gets_missing_info_reply() -> Result<()> {
    let h = harness("unused")?;
    let transport = RecordingTransport::default();

    h.router.on_photo(&transport, ADMIN, &[], None).await?;

    assert_eq!(transport.texts(), vec![views::PHOTO_INFO_MISSING]);
    let uploads = h.backend.uploads.lock().map(|u| u.len()).unwrap_or_default();
    assert_eq!(uploads, 0);
    Ok(())
}
