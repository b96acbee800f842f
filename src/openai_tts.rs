use crate::audio_output::AudioOutput;
use crate::config::SpeechConfig;
use crate::speech::{InterruptFlag, SpeechEngine};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::io::Cursor;

/// OpenAI TTS APIによる音声合成エンジン
///
/// テキストをWAVとして合成し、出力デバイスで再生する。
/// 中断フラグは合成完了後と再生中に確認する。
pub struct OpenAiTtsEngine {
    config: SpeechConfig,
    client: reqwest::Client,
    output: AudioOutput,
}

impl OpenAiTtsEngine {
    pub fn new(config: SpeechConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("TTS用HTTPクライアント作成失敗")?;

        let output = AudioOutput::start(config.output_device.as_deref(), config.sample_rate)?;

        Ok(Self {
            config,
            client,
            output,
        })
    }

    /// TTS APIを呼び出してWAVデータを取得
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let body = json!({
            "model": self.config.model,
            "voice": self.config.voice,
            "input": text,
            "response_format": "wav",
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&body)
            .send()
            .await
            .context("TTS API リクエスト失敗")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("TTS API エラー: {} - {}", status, error_text);
        }

        let bytes = response
            .bytes()
            .await
            .context("TTS API レスポンス受信失敗")?;
        Ok(bytes.to_vec())
    }

    /// WAVデータをPCMサンプルにデコード
    fn wav_to_pcm(wav_data: &[u8]) -> Result<Vec<i16>> {
        let reader =
            hound::WavReader::new(Cursor::new(wav_data)).context("WAVデータの読み込みに失敗")?;
        let samples: std::result::Result<Vec<i16>, _> = reader.into_samples::<i16>().collect();
        samples.context("WAVサンプルのデコードに失敗")
    }
}

#[async_trait]
impl SpeechEngine for OpenAiTtsEngine {
    async fn vocalize(&mut self, text: &str, interrupt: &InterruptFlag) -> Result<()> {
        log::debug!("発話を合成します: {}", text);
        let wav_data = self.synthesize(text).await?;

        if interrupt.is_raised() {
            // 合成中に中断された。再生せずに戻る
            return Ok(());
        }

        let samples = Self::wav_to_pcm(&wav_data)?;
        self.output.play(&samples, interrupt).await
    }
}
