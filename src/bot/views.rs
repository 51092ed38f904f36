//! Bot texts and keyboards

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

// ─────────────────────────────────────────────────────────────────────────────
// Callback constants
// ─────────────────────────────────────────────────────────────────────────────

/// Callback data for listing allowed users
pub const CALLBACK_LIST_USERS: &str = "list_users";
/// Callback data for starting the add-user flow
pub const CALLBACK_ADD_USER: &str = "add_user";
/// Callback data for starting the remove-user flow
pub const CALLBACK_REMOVE_USER: &str = "remove_user";

// ─────────────────────────────────────────────────────────────────────────────
// Texts
// ─────────────────────────────────────────────────────────────────────────────

/// Greeting for `/start`
pub const GREETING: &str =
    "👋 Привет! Отправь мне любой вопрос, и я постараюсь ответить на него.";
/// Reply to users who are neither admins nor allow-listed
pub const ACCESS_DENIED: &str = "Извините, у вас нет доступа к боту.";
/// Reply to non-admins attempting admin actions
pub const NOT_ADMIN: &str = "У вас нет прав администратора.";
/// Caption of the admin panel
pub const ADMIN_PANEL: &str = "Панель администратора:";
/// Prompt after choosing "add user"
pub const ASK_ADD_ID: &str = "Отправьте ID пользователя, которого хотите добавить.";
/// Prompt after choosing "remove user"
pub const ASK_REMOVE_ID: &str = "Отправьте ID пользователя, которого хотите удалить.";
/// Reply when an admin sends something that is not a user id
pub const INVALID_ID: &str = "Пожалуйста, отправьте корректный ID пользователя (число).";
/// Interim reply before answering a text message
pub const WAIT_TEXT: &str = "Подождите, я анализирую ваше сообщение...🤔";
/// Interim reply before answering a photo
pub const WAIT_PHOTO: &str = "Подождите, я анализирую фото...🤔";
/// Reply to a photo message that carries no downloadable size
pub const PHOTO_INFO_MISSING: &str = "Не удалось получить информацию о фото.";

/// Confirmation of an addition
#[must_use]
pub fn user_added(user_id: i64) -> String {
    format!("Пользователь {user_id} успешно добавлен.")
}

/// Confirmation of a removal
#[must_use]
pub fn user_removed(user_id: i64) -> String {
    format!("Пользователь {user_id} успешно удален.")
}

/// Removal of an id that is not on the allow-list
#[must_use]
pub fn user_not_found(user_id: i64) -> String {
    format!("Пользователь {user_id} не найден в списке разрешенных.")
}

/// Allow-list listing, one id per line
#[must_use]
pub fn allowed_users_list(users: &[i64]) -> String {
    let ids: Vec<String> = users.iter().map(ToString::to_string).collect();
    format!("Список разрешенных пользователей:\n{}", ids.join("\n"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Keyboards
// ─────────────────────────────────────────────────────────────────────────────

/// Inline keyboard of the admin panel
#[must_use]
pub fn admin_panel_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "📋 Список пользователей",
            CALLBACK_LIST_USERS,
        )],
        vec![InlineKeyboardButton::callback(
            "➕ Добавить пользователя",
            CALLBACK_ADD_USER,
        )],
        vec![InlineKeyboardButton::callback(
            "➖ Удалить пользователя",
            CALLBACK_REMOVE_USER,
        )],
    ])
}
