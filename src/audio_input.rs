use crate::config::AudioConfig;
use crate::types::{AudioChunk, AudioFormat};
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SizedSample};
use regex_lite::Regex;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

/// マイクからの共有音声入力ストリーム
///
/// プロセス中に存在するマイクストリームはこの1本だけ。
/// 起動時に一度開き、終了時に一度だけ閉じる。
/// 読み手は [`AudioStream`] を経由し、`&mut` 借用によって
/// 「同時に読むのは常に1つ」という制約を型で保証する。
pub struct AudioInput {
    device: cpal::Device,
    config: cpal::StreamConfig,
    stream: Option<cpal::Stream>,
    num_channels: u16,
}

/// 音声チャンクの受信側
///
/// ウェイクワード検出器と文字起こしが交互に消費する。
/// どちらも `&mut AudioStream` を要求するため、
/// 2つの消費者が同時にストリームを読むことはできない。
pub struct AudioStream {
    rx: mpsc::Receiver<AudioChunk>,
}

impl AudioStream {
    /// 次のチャンクを受信する
    ///
    /// 入力ストリームが停止していれば `None` を返す。
    pub async fn next_chunk(&mut self) -> Option<AudioChunk> {
        self.rx.recv().await
    }
}

impl AudioInput {
    /// 新しいAudioInputを作成
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        // デバイスを取得
        let device = if config.device_id == "default" {
            host.default_input_device()
                .context("デフォルト入力デバイスが見つかりません")?
        } else {
            // デバイスIDが指定されている場合は、デバイス一覧から検索
            Self::input_devices()?
                .into_iter()
                .find(|d| d.name().ok().as_deref() == Some(&config.device_id))
                .with_context(|| format!("デバイスが見つかりません: {}", config.device_id))?
        };

        log::info!("入力デバイス: {:?}", device.name());

        let default_config = device
            .default_input_config()
            .context("デフォルト入力設定が取得できません")?;

        log::info!(
            "デバイス設定: {:?}, {}Hz, {}ch",
            default_config.sample_format(),
            default_config.sample_rate().0,
            default_config.channels()
        );

        let stream_config = cpal::StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(4096),
        };

        Ok(Self {
            device,
            config: stream_config,
            stream: None,
            num_channels: config.channels,
        })
    }

    /// ストリームを開始し、チャンクの受信側を返す
    ///
    /// 呼ぶのはプロセスごとに一度だけ。
    pub fn start(&mut self) -> Result<AudioStream> {
        let num_channels = self.num_channels;
        let sample_rate = self.config.sample_rate.0;

        let (tx, rx) = mpsc::channel(1024);

        let default_config = self.device.default_input_config()?;

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => self.build_stream::<f32>(tx, num_channels, sample_rate)?,
            cpal::SampleFormat::I16 => self.build_stream::<i16>(tx, num_channels, sample_rate)?,
            cpal::SampleFormat::U16 => self.build_stream::<u16>(tx, num_channels, sample_rate)?,
            cpal::SampleFormat::I32 => self.build_stream::<i32>(tx, num_channels, sample_rate)?,
            _ => anyhow::bail!("サポートされていないサンプルフォーマット"),
        };

        stream.play().context("ストリームの再生開始に失敗")?;
        self.stream = Some(stream);

        log::info!("音声入力ストリームを開始しました");

        Ok(AudioStream { rx })
    }

    /// ストリームを構築
    ///
    /// インターリーブされたデータから先頭チャンネルだけを取り出し、
    /// モノラルのi16チャンクとして送信する。
    fn build_stream<T>(
        &self,
        tx: mpsc::Sender<AudioChunk>,
        num_channels: u16,
        sample_rate: u32,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + Sample + Send + 'static,
        <T as Sample>::Float: Into<f32>,
    {
        let data_callback = move |data: &[T], _info: &cpal::InputCallbackInfo| {
            let timestamp_ns = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos();

            let samples_per_channel = data.len() / num_channels as usize;
            let mut channel_samples = Vec::with_capacity(samples_per_channel);
            for frame in 0..samples_per_channel {
                let idx = frame * num_channels as usize;
                let sample = data[idx];
                let f = sample.to_float_sample().into();
                let clamped = f.clamp(-1.0, 1.0);
                channel_samples.push((clamped * i16::MAX as f32) as i16);
            }

            let chunk = AudioChunk {
                samples: channel_samples,
                format: AudioFormat {
                    sample_rate,
                    channels: 1, // モノラル
                },
                timestamp_ns,
            };

            // 非同期送信（コールバック内ではブロッキングしない）
            match tx.try_send(chunk) {
                Ok(_) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!("音声チャンク送信失敗: バッファ満杯");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // 受信側が停止済み。終了処理中に起こりうる
                }
            }
        };

        let error_callback = move |err| {
            log::error!("ストリームエラー: {}", err);
        };

        let stream = self
            .device
            .build_input_stream(&self.config, data_callback, error_callback, None)
            .context("入力ストリームの構築に失敗")?;

        Ok(stream)
    }

    /// ストリームを停止
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            log::info!("音声入力ストリームを停止しました");
        }
    }

    /// デバイス一覧を表示
    pub fn list_devices() -> Result<()> {
        println!("利用可能な入力デバイス:");
        println!();

        for (idx, device) in Self::input_devices()?.into_iter().enumerate() {
            let name = device.name()?;
            println!("  [{}] {}", idx, name);

            device.supported_input_configs()?.for_each(|config_range| {
                println!(
                    "      フォーマット: {:?}, {}-{}Hz, {}ch",
                    config_range.sample_format(),
                    config_range.min_sample_rate().0,
                    config_range.max_sample_rate().0,
                    config_range.channels()
                );
            });
            println!();
        }

        Ok(())
    }

    /// 通常入力デバイスとして利用してはいけないデバイスを除外した一覧を取得
    fn input_devices() -> Result<Vec<cpal::Device>> {
        let host = cpal::default_host();
        let excluded_names_regex = Regex::new(
            "MacBook (Air|Pro)|AirPods|iPhone|Webcam|Background|Microsoft Teams|ZoomAudioDevice",
        )
        .expect("invalid device exclusion regex");
        let devices = host
            .input_devices()?
            .filter(|device| {
                if let Ok(name) = device.name() {
                    !excluded_names_regex.is_match(&name)
                } else {
                    true
                }
            })
            .collect();
        Ok(devices)
    }
}

impl Drop for AudioInput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
impl AudioStream {
    /// テスト用にチャンネルから直接組み立てる
    pub(crate) fn from_receiver(rx: mpsc::Receiver<AudioChunk>) -> Self {
        Self { rx }
    }
}
