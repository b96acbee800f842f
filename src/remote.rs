use crate::config::RemoteConfig;
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::time::Duration;

/// リモート音楽サービスへのコマンド送信クライアント
///
/// すべての送信は同期的（呼び出し側がawaitする）で、リトライも
/// バックオフもしない。失敗はここで握りつぶし、制御ループには
/// 決して伝播させない。
pub struct RemoteCommandClient {
    client: reqwest::Client,
    base_url: String,
    guild_id: String,
    user_id: String,
    voice_channel_id: String,
}

impl RemoteCommandClient {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("リモートコマンド用HTTPクライアント作成失敗")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            guild_id: config.guild_id.clone(),
            user_id: config.user_id.clone(),
            voice_channel_id: config.voice_channel_id.clone(),
        })
    }

    /// 曲の再生リクエストを送信
    ///
    /// 成功時はレスポンスのJSONを返す。トランスポートエラーも
    /// デコードエラーも診断ログを出して `None` を返す。
    pub async fn send_play(&self, song_query: &str) -> Option<Value> {
        let url = format!("{}/command/play", self.base_url);
        let payload = self.play_payload(song_query);

        match self.post(&url, &payload).await {
            Ok(response) => {
                Self::log_packet("/play", &payload);
                Some(response)
            }
            Err(e) => {
                log::error!("再生リクエストの送信に失敗: {:#}", e);
                None
            }
        }
    }

    /// 再生制御コマンドを送信
    ///
    /// `name` は "pause" や "stop" などのコマンド名。
    /// 失敗契約は [`send_play`](Self::send_play) と同じ。
    pub async fn send_command(&self, name: &str) -> Option<Value> {
        let url = format!("{}/command/{}", self.base_url, name);
        let payload = self.command_payload();

        match self.post(&url, &payload).await {
            Ok(response) => {
                Self::log_packet(name, &payload);
                Some(response)
            }
            Err(e) => {
                log::error!("コマンド {} の送信に失敗: {:#}", name, e);
                None
            }
        }
    }

    async fn post(&self, url: &str, payload: &Value) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .context("リクエスト送信失敗")?;

        // レスポンスはトップレベルのJSONデコードだけ行い、中身は解釈しない
        let value = response
            .json::<Value>()
            .await
            .context("レスポンスのデコード失敗")?;
        Ok(value)
    }

    fn play_payload(&self, song_query: &str) -> Value {
        json!({
            "guildId": self.guild_id,
            "userId": self.user_id,
            "voiceChannelId": self.voice_channel_id,
            "options": { "query": song_query },
        })
    }

    fn command_payload(&self) -> Value {
        json!({
            "guildId": self.guild_id,
            "userId": self.user_id,
            "voiceChannelId": self.voice_channel_id,
            "options": {},
        })
    }

    /// 送信済みパケットの確認を1行出力する
    fn log_packet(command: &str, payload: &Value) {
        let timestamp = chrono::Local::now().format("%H:%M:%S");
        println!("[{}] sent: {} {}", timestamp, command, payload);
    }
}
