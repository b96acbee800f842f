use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub wake: WakeConfig,
    #[serde(default)]
    pub vad: VadConfig,
    #[serde(default)]
    pub transcribe: TranscribeConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

/// オーディオ入力設定
///
/// マイクデバイスからの入力に関する設定。
///
/// # デフォルト値
///
/// - `device_id`: "default" (システムのデフォルトデバイス)
/// - `sample_rate`: 16000 Hz (16kHz - Whisper/rustpotterの推奨値)
/// - `channels`: 1 (モノラル)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    #[serde(default = "default_device_id")]
    pub device_id: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
}

/// ウェイクワード検出設定
///
/// rustpotterによる起動フレーズ検出に関する設定。
///
/// # デフォルト値
///
/// - `model_path`: "./models/jarvis.rpw"
/// - `threshold`: 0.4
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WakeConfig {
    #[serde(default = "default_wake_model_path")]
    pub model_path: String,
    #[serde(default = "default_wake_threshold")]
    pub threshold: f32,
}

/// VAD (Voice Activity Detection) 設定
///
/// 音声区間検出に関する設定。ハングオーバー期間は
/// 発話終端（エンドポイント）の無音判定時間を兼ねる。
///
/// # デフォルト値
///
/// - `threshold_db`: -40.0 dB
/// - `hangover_duration_ms`: 800 ms
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VadConfig {
    #[serde(default = "default_threshold_db")]
    pub threshold_db: f32,
    #[serde(default = "default_hangover_duration_ms")]
    pub hangover_duration_ms: u32,
}

/// 文字起こし設定
///
/// OpenAI Whisper APIによる発話の文字起こしに関する設定。
///
/// # デフォルト値
///
/// - `model`: "whisper-1"
/// - `partial_interval_ms`: 1500 ms (部分転写の生成間隔)
/// - `listen_timeout_ms`: 6000 ms (発話が始まらない場合の待機上限)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscribeConfig {
    /// OpenAI API Key（環境変数 OPENAI_API_KEY で上書き可能）
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_whisper_model")]
    pub model: String,
    /// 言語コード（"ja", "en" など）。省略可能
    pub language: Option<String>,
    /// 捕捉済み音声がこの時間分たまるごとに部分転写を生成する
    #[serde(default = "default_partial_interval_ms")]
    pub partial_interval_ms: u64,
    /// 発話が始まらないままこの時間分の音声を消費したら聴取を打ち切る
    #[serde(default = "default_listen_timeout_ms")]
    pub listen_timeout_ms: u64,
}

/// 音声合成設定
///
/// OpenAI TTS APIによる応答の発話に関する設定。
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpeechConfig {
    /// OpenAI API Key（環境変数 OPENAI_API_KEY で上書き可能）
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_tts_model")]
    pub model: String,
    #[serde(default = "default_tts_voice")]
    pub voice: String,
    /// 合成音声のサンプリングレート (Hz)
    ///
    /// OpenAI TTSのWAV出力は24kHz固定
    #[serde(default = "default_tts_sample_rate")]
    pub sample_rate: u32,
    /// 出力デバイス名。省略時はデフォルトデバイス
    pub output_device: Option<String>,
}

/// リモート音楽サービス設定
///
/// vibesbotへのコマンド送信に関する設定。
/// 識別子3つは環境変数 GUILD_ID / USER_ID / VOICE_CHANNEL_ID で上書き可能。
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub guild_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub voice_channel_id: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

// Default functions
fn default_device_id() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    16000 // 16kHz - Whisper/rustpotterの推奨値
}

fn default_channels() -> u16 {
    1
}

fn default_wake_model_path() -> String {
    "./models/jarvis.rpw".to_string()
}

fn default_wake_threshold() -> f32 {
    0.4
}

fn default_threshold_db() -> f32 {
    -40.0
}

fn default_hangover_duration_ms() -> u32 {
    800
}

fn default_whisper_model() -> String {
    "whisper-1".to_string()
}

fn default_partial_interval_ms() -> u64 {
    1500
}

fn default_listen_timeout_ms() -> u64 {
    6000
}

fn default_tts_model() -> String {
    "tts-1".to_string()
}

fn default_tts_voice() -> String {
    "onyx".to_string()
}

fn default_tts_sample_rate() -> u32 {
    24000
}

fn default_base_url() -> String {
    "https://vibesbot.no-vibes.com".to_string()
}

fn default_timeout_seconds() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            wake: WakeConfig::default(),
            vad: VadConfig::default(),
            transcribe: TranscribeConfig::default(),
            speech: SpeechConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            sample_rate: default_sample_rate(),
            channels: default_channels(),
        }
    }
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            model_path: default_wake_model_path(),
            threshold: default_wake_threshold(),
        }
    }
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold_db: default_threshold_db(),
            hangover_duration_ms: default_hangover_duration_ms(),
        }
    }
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_whisper_model(),
            language: None,
            partial_interval_ms: default_partial_interval_ms(),
            listen_timeout_ms: default_listen_timeout_ms(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_tts_model(),
            voice: default_tts_voice(),
            sample_rate: default_tts_sample_rate(),
            output_device: None,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            guild_id: String::new(),
            user_id: String::new(),
            voice_channel_id: String::new(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Config {
    /// 設定ファイルから読み込み
    ///
    /// TOML形式の設定ファイルをパースしてConfig構造体を生成する。
    ///
    /// # Errors
    ///
    /// ファイルの読み込みまたはパースに失敗した場合にエラーを返す。
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use vibes_voice::config::Config;
    /// let config = Config::from_file("config.toml").unwrap();
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("設定ファイルの読み込みに失敗: {:?}", path.as_ref()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "設定ファイルのパースに失敗")?;
        Ok(config)
    }

    /// デフォルト設定をファイルに書き出し
    ///
    /// デフォルト値を持つ設定ファイルを生成する。
    /// 既存のファイルは上書きされる。
    ///
    /// # Errors
    ///
    /// ファイルの書き込みに失敗した場合にエラーを返す。
    pub fn write_default<P: AsRef<Path>>(path: P) -> Result<()> {
        let config = Config::default();
        let content =
            toml::to_string_pretty(&config).with_context(|| "設定のシリアライズに失敗")?;
        fs::write(path.as_ref(), content)
            .with_context(|| format!("設定ファイルの書き込みに失敗: {:?}", path.as_ref()))?;
        Ok(())
    }

    /// 設定ファイルがあれば読み込み、なければデフォルトを使用
    ///
    /// # Errors
    ///
    /// ファイルが存在するがパースに失敗した場合にエラーを返す。
    /// ファイルが存在しない場合はエラーにならず、デフォルト設定を返す。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            log::warn!(
                "設定ファイルが見つかりません。デフォルト設定を使用します: {:?}",
                path.as_ref()
            );
            Ok(Config::default())
        }
    }

    /// 環境変数による上書きを適用
    ///
    /// プロセス環境から読み取った識別子とAPIキーで設定値を上書きする。
    /// 起動時に一度だけ呼ぶこと。
    ///
    /// - `GUILD_ID` → `remote.guild_id`
    /// - `USER_ID` → `remote.user_id`
    /// - `VOICE_CHANNEL_ID` → `remote.voice_channel_id`
    /// - `OPENAI_API_KEY` → `transcribe.api_key` / `speech.api_key`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("GUILD_ID") {
            self.remote.guild_id = v;
        }
        if let Ok(v) = std::env::var("USER_ID") {
            self.remote.user_id = v;
        }
        if let Ok(v) = std::env::var("VOICE_CHANNEL_ID") {
            self.remote.voice_channel_id = v;
        }
        if let Ok(v) = std::env::var("OPENAI_API_KEY") {
            self.transcribe.api_key = v.clone();
            self.speech.api_key = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.vad.threshold_db, -40.0);
        assert_eq!(config.vad.hangover_duration_ms, 800);
        assert_eq!(config.wake.threshold, 0.4);
        assert_eq!(config.transcribe.model, "whisper-1");
        assert_eq!(config.speech.model, "tts-1");
        assert_eq!(config.remote.base_url, "https://vibesbot.no-vibes.com");
        assert!(config.remote.guild_id.is_empty());
    }

    #[test]
    fn test_write_and_read_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        // デフォルト設定を書き込み
        Config::write_default(path).unwrap();

        // 読み込み
        let config = Config::from_file(path).unwrap();
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.transcribe.model, "whisper-1");
    }

    #[test]
    fn test_custom_config() {
        let toml_content = r#"
[audio]
device_id = "test-device"
sample_rate = 16000
channels = 1

[wake]
model_path = "/tmp/wake.rpw"
threshold = 0.55

[vad]
threshold_db = -30.0
hangover_duration_ms = 1000

[transcribe]
api_key = "sk-test"
model = "whisper-1"
language = "en"
partial_interval_ms = 2000
listen_timeout_ms = 8000

[speech]
api_key = "sk-test"
model = "tts-1-hd"
voice = "alloy"

[remote]
base_url = "http://localhost:8080"
guild_id = "g1"
user_id = "u1"
voice_channel_id = "vc1"
timeout_seconds = 5
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();

        assert_eq!(config.audio.device_id, "test-device");
        assert_eq!(config.wake.model_path, "/tmp/wake.rpw");
        assert_eq!(config.wake.threshold, 0.55);
        assert_eq!(config.vad.threshold_db, -30.0);
        assert_eq!(config.vad.hangover_duration_ms, 1000);
        assert_eq!(config.transcribe.language.as_deref(), Some("en"));
        assert_eq!(config.transcribe.partial_interval_ms, 2000);
        assert_eq!(config.speech.voice, "alloy");
        assert_eq!(config.remote.base_url, "http://localhost:8080");
        assert_eq!(config.remote.guild_id, "g1");
        assert_eq!(config.remote.timeout_seconds, 5);
    }

    #[test]
    fn test_load_or_default_nonexistent() {
        let config = Config::load_or_default("nonexistent_file.toml").unwrap();
        // デフォルト設定が返されることを確認
        assert_eq!(config.audio.sample_rate, 16000);
    }

    #[test]
    fn test_partial_config() {
        // 一部の設定のみ記述した場合、残りはデフォルト値が使われる
        let toml_content = r#"
[audio]
sample_rate = 32000

[remote]
guild_id = "g42"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();

        // 指定した値
        assert_eq!(config.audio.sample_rate, 32000);
        assert_eq!(config.remote.guild_id, "g42");

        // デフォルト値
        assert_eq!(config.audio.device_id, "default");
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.vad.threshold_db, -40.0);
        assert_eq!(config.remote.base_url, "https://vibesbot.no-vibes.com");
    }

    #[test]
    fn test_env_overrides() {
        // 環境変数を触るテストはこの1本に集約する
        std::env::set_var("GUILD_ID", "env-guild");
        std::env::set_var("USER_ID", "env-user");
        std::env::set_var("VOICE_CHANNEL_ID", "env-vc");
        std::env::set_var("OPENAI_API_KEY", "sk-env");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.remote.guild_id, "env-guild");
        assert_eq!(config.remote.user_id, "env-user");
        assert_eq!(config.remote.voice_channel_id, "env-vc");
        assert_eq!(config.transcribe.api_key, "sk-env");
        assert_eq!(config.speech.api_key, "sk-env");

        std::env::remove_var("GUILD_ID");
        std::env::remove_var("USER_ID");
        std::env::remove_var("VOICE_CHANNEL_ID");
        std::env::remove_var("OPENAI_API_KEY");
    }
}
