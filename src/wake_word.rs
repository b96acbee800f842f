use crate::audio_input::AudioStream;
use crate::config::WakeConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rustpotter::{Rustpotter, RustpotterConfig, SampleFormat};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// ウェイクワード検出器の共通トレイト
///
/// 起動フレーズが検出されるまでストリームを消費し続ける。
/// 検出途中のキャンセル手段は持たない。停止要求の確認は
/// チャンク境界でのみ行う。
#[async_trait]
pub trait WakeWordDetector: Send {
    /// 起動フレーズを待つ
    ///
    /// # Returns
    /// * `Ok(true)` - 検出した
    /// * `Ok(false)` - 停止要求を受けた
    /// * `Err` - 入力ストリームが停止した
    async fn wait_for_wake_word(&mut self, stream: &mut AudioStream) -> Result<bool>;
}

/// rustpotterによるウェイクワード検出
pub struct RustpotterDetector {
    detector: Rustpotter,
    /// 検出器のフレーム長に合わせるための持ち越しバッファ
    frame_buffer: Vec<f32>,
    running: Arc<AtomicBool>,
}

impl RustpotterDetector {
    pub fn new(config: &WakeConfig, sample_rate: u32, running: Arc<AtomicBool>) -> Result<Self> {
        let mut rp_config = RustpotterConfig::default();
        rp_config.fmt.sample_rate = sample_rate as usize;
        rp_config.fmt.channels = 1;
        rp_config.fmt.sample_format = SampleFormat::F32;
        rp_config.detector.threshold = config.threshold;

        let mut detector = Rustpotter::new(&rp_config)
            .map_err(|e| anyhow!("rustpotter検出器の作成に失敗: {}", e))?;
        detector
            .add_wakeword_from_file("wakeword", &config.model_path)
            .map_err(|e| {
                anyhow!(
                    "ウェイクワードモデルの読み込みに失敗 ({}): {}",
                    config.model_path,
                    e
                )
            })?;

        log::info!("ウェイクワードモデルを読み込みました: {}", config.model_path);

        Ok(Self {
            detector,
            frame_buffer: Vec::new(),
            running,
        })
    }
}

#[async_trait]
impl WakeWordDetector for RustpotterDetector {
    async fn wait_for_wake_word(&mut self, stream: &mut AudioStream) -> Result<bool> {
        self.frame_buffer.clear();
        let frame_size = self.detector.get_samples_per_frame();

        loop {
            if !self.running.load(Ordering::SeqCst) {
                return Ok(false);
            }

            let chunk = stream
                .next_chunk()
                .await
                .context("音声入力ストリームが停止しました")?;

            self.frame_buffer.extend(
                chunk
                    .samples
                    .iter()
                    .map(|&s| s as f32 / i16::MAX as f32),
            );

            while self.frame_buffer.len() >= frame_size {
                let frame: Vec<f32> = self.frame_buffer.drain(..frame_size).collect();
                if self.detector.process_samples(frame).is_some() {
                    log::info!("ウェイクワードを検出しました");
                    self.frame_buffer.clear();
                    return Ok(true);
                }
            }
        }
    }
}
