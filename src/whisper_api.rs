use crate::config::TranscribeConfig;
use crate::transcribe_backend::TranscribeBackend;
use crate::types::SampleI16;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use std::io::Cursor;

/// OpenAI Whisper API レスポンス
#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
}

/// OpenAI Whisper API バックエンド
///
/// 発話区間のPCMをメモリ上でWAVに変換し、multipartでアップロードする。
pub struct WhisperBackend {
    config: TranscribeConfig,
    sample_rate: u32,
    client: reqwest::Client,
}

impl WhisperBackend {
    pub fn new(config: TranscribeConfig, sample_rate: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Whisper API HTTPクライアント作成失敗")?;

        Ok(Self {
            config,
            sample_rate,
            client,
        })
    }

    /// PCMデータをWAVフォーマットに変換
    fn pcm_to_wav(&self, pcm_data: &[SampleI16]) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer =
                hound::WavWriter::new(&mut cursor, spec).context("WAVライター作成失敗")?;

            for &sample in pcm_data {
                writer.write_sample(sample).context("WAV書き込み失敗")?;
            }

            writer.finalize().context("WAV finalize失敗")?;
        }

        Ok(cursor.into_inner())
    }
}

#[async_trait]
impl TranscribeBackend for WhisperBackend {
    async fn transcribe(&self, pcm: &[SampleI16]) -> Result<String> {
        if pcm.is_empty() {
            return Ok(String::new());
        }

        let wav_data = self.pcm_to_wav(pcm)?;
        log::debug!("Whisper API: WAVデータサイズ {} バイト", wav_data.len());

        let part = multipart::Part::bytes(wav_data)
            .file_name("audio.wav")
            .mime_str("audio/wav")?;

        let mut form = multipart::Form::new()
            .part("file", part)
            .text("model", self.config.model.clone());

        if let Some(ref language) = self.config.language {
            form = form.text("language", language.clone());
        }

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .multipart(form)
            .send()
            .await
            .context("Whisper API リクエスト失敗")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Whisper API エラー: {} - {}", status, error_text);
        }

        let whisper_response: WhisperResponse = response
            .json::<WhisperResponse>()
            .await
            .context("Whisper API レスポンスパース失敗")?;

        Ok(whisper_response.text)
    }
}
