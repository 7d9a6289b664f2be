use anyhow::Result;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::ParseMode;

use crate::config::TelegramSettings;

/// Send one notification through the Bot API.
/// Equivalent to `POST https://api.telegram.org/bot<token>/sendMessage`
/// with `chat_id`, `text` and `parse_mode=HTML`.
pub async fn send(tg: &TelegramSettings, text: &str) -> Result<()> {
    let bot = Bot::new(&tg.token);
    bot.send_message(ChatId(tg.chat_id), text)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

/// Validate a bot token by calling getMe API
pub async fn validate_token(token: &str) -> Result<String> {
    let url = format!("https://api.telegram.org/bot{}/getMe", token);
    let resp = reqwest::get(&url).await?;

    if !resp.status().is_success() {
        anyhow::bail!("Invalid token or network error");
    }

    let json: serde_json::Value = resp.json().await?;
    let bot_name = json["result"]["username"]
        .as_str()
        .unwrap_or("unknown")
        .to_string();

    Ok(bot_name)
}
