// Конфигурация приложения
// Логирование можно отключить только в режиме разработки

use crate::error::{Error, Result};
use crate::peer::types::ServerConfig;
use once_cell::sync::Lazy;
use std::time::Duration;

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true; // В режиме отладки логирование включено

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false; // В продакшене логирование отключено

// Дополнительные настройки для режима разработки
#[cfg(debug_assertions)]
pub mod dev {
    // Для полного отключения логирования в режиме разработки
    // измените эту константу на false
    pub const ENABLE_LOGGING: bool = true;
}

#[cfg(not(debug_assertions))]
pub mod dev {
    pub const ENABLE_LOGGING: bool = false;
}

/// Период ожидания перед принудительным завершением звонка
pub const GRACE_PERIOD: Duration = Duration::from_secs(10);

/// STUN серверы по умолчанию
pub static DEFAULT_ICE_SERVERS: Lazy<Vec<ServerConfig>> = Lazy::new(|| {
    vec![
        ServerConfig {
            id: "default-stun-0".into(),
            r#type: "stun".into(),
            url: "stun:stun.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
        ServerConfig {
            id: "default-stun-1".into(),
            r#type: "stun".into(),
            url: "stun:stun1.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
    ]
});

/// Настройки клиента звонков
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Адрес сигнального сервера
    pub signaling_url: String,
    /// Пользовательские ICE серверы; None — дефолтные STUN
    pub ice_servers: Option<Vec<ServerConfig>>,
    /// Отвечать на входящие звонки автоматически
    pub auto_answer: bool,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://127.0.0.1:9000/peercall".into(),
            ice_servers: None,
            auto_answer: true,
        }
    }
}

/// Валидация пользовательских ICE серверов
pub fn validate_ice_servers(servers: &[ServerConfig]) -> Result<()> {
    for server in servers {
        if server.url.is_empty() {
            return Err(Error::Config("server URL cannot be empty".into()));
        }

        if server.r#type == "turn" && (server.username.is_none() || server.credential.is_none()) {
            return Err(Error::Config("TURN servers require username and credential".into()));
        }
    }
    Ok(())
}
