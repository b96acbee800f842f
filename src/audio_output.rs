use crate::speech::InterruptFlag;
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// 音声出力デバイスマネージャ
///
/// 合成音声の再生を担当する。cpalのStreamはSendではないため、
/// ストリーム本体は専用スレッド上に置き、このハンドルは
/// 共有サンプルバッファと停止フラグだけを持つ。
/// ハンドル側はSendなので、発話ワーカータスクの中から使える。
pub struct AudioOutput {
    buffer: Arc<Mutex<Vec<i16>>>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl AudioOutput {
    /// 出力ストリームを開始する
    ///
    /// ストリーム構築は専用スレッド上で行い、結果を同期的に受け取る。
    /// デバイスが開けない場合は起動時エラーとして伝播する。
    pub fn start(device_name: Option<&str>, sample_rate: u32) -> Result<Self> {
        let buffer: Arc<Mutex<Vec<i16>>> = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();

        let device_name = device_name.map(|s| s.to_string());
        let buffer_clone = buffer.clone();
        let stop_clone = stop.clone();

        let handle = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                Self::run_stream(device_name, sample_rate, buffer_clone, stop_clone, ready_tx);
            })
            .context("音声出力スレッドの起動に失敗")?;

        ready_rx
            .recv()
            .context("音声出力スレッドが応答しません")??;

        Ok(Self {
            buffer,
            stop,
            handle: Some(handle),
        })
    }

    /// 専用スレッド本体。ストリームを構築して停止要求まで保持する
    fn run_stream(
        device_name: Option<String>,
        sample_rate: u32,
        buffer: Arc<Mutex<Vec<i16>>>,
        stop: Arc<AtomicBool>,
        ready_tx: std::sync::mpsc::Sender<Result<()>>,
    ) {
        let stream = match Self::build_stream_for_device(device_name, sample_rate, buffer) {
            Ok(stream) => {
                let _ = ready_tx.send(Ok(()));
                stream
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        while !stop.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(50));
        }

        drop(stream);
        log::info!("出力ストリームを停止しました");
    }

    fn build_stream_for_device(
        device_name: Option<String>,
        sample_rate: u32,
        buffer: Arc<Mutex<Vec<i16>>>,
    ) -> Result<Stream> {
        let host = cpal::default_host();

        let device = if let Some(name) = device_name {
            host.output_devices()?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| anyhow::anyhow!("出力デバイス '{}' が見つかりません", name))?
        } else {
            host.default_output_device()
                .ok_or_else(|| anyhow::anyhow!("デフォルト出力デバイスが見つかりません"))?
        };

        log::info!("出力デバイス: {}", device.name()?);

        let default_config = device
            .default_output_config()
            .context("デフォルト出力設定が取得できません")?;

        let config = StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = match default_config.sample_format() {
            SampleFormat::F32 => Self::build_stream::<f32>(&device, config, buffer)?,
            SampleFormat::I16 => Self::build_stream::<i16>(&device, config, buffer)?,
            SampleFormat::U16 => Self::build_stream::<u16>(&device, config, buffer)?,
            _ => anyhow::bail!(
                "サポートされていないサンプルフォーマット: {:?}",
                default_config.sample_format()
            ),
        };

        stream.play().context("ストリームの再生開始に失敗")?;
        Ok(stream)
    }

    /// 指定されたサンプルフォーマットで出力ストリームを構築
    fn build_stream<T>(
        device: &Device,
        config: StreamConfig,
        buffer: Arc<Mutex<Vec<i16>>>,
    ) -> Result<Stream>
    where
        T: SizedSample + Sample + FromSample<f32> + Send + 'static,
    {
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let mut buffer = buffer.lock().unwrap();

                    if buffer.len() >= data.len() {
                        for (i, sample) in data.iter_mut().enumerate() {
                            *sample = Self::convert_sample::<T>(buffer[i]);
                        }
                        buffer.drain(..data.len());
                    } else {
                        // バッファが不足している場合、利用可能な分だけコピーして残りは無音
                        let available = buffer.len();
                        for (i, sample) in data.iter_mut().enumerate() {
                            if i < available {
                                *sample = Self::convert_sample::<T>(buffer[i]);
                            } else {
                                *sample = Sample::EQUILIBRIUM;
                            }
                        }
                        if available > 0 {
                            buffer.clear();
                        }
                    }
                },
                move |err| {
                    log::error!("出力ストリームエラー: {}", err);
                },
                None,
            )
            .context("出力ストリームの構築に失敗")?;

        Ok(stream)
    }

    /// i16サンプルを指定されたフォーマットに変換
    fn convert_sample<T: Sample + FromSample<f32>>(sample: i16) -> T {
        // i16を-1.0~1.0の範囲に正規化してから対象フォーマットに変換
        let normalized = sample as f32 / i16::MAX as f32;
        T::from_sample(normalized)
    }

    /// サンプルを再生し、鳴り終わるか中断されるまで待つ
    ///
    /// 中断フラグが立つとバッファを破棄して即座に戻る。
    /// 再生済み分を巻き戻すことはできないが、残りの音は出ない。
    pub async fn play(&self, samples: &[i16], interrupt: &InterruptFlag) -> Result<()> {
        if interrupt.is_raised() {
            return Ok(());
        }

        {
            let mut buffer = self.buffer.lock().unwrap();
            buffer.extend_from_slice(samples);
        }

        loop {
            tokio::time::sleep(Duration::from_millis(20)).await;

            if interrupt.is_raised() {
                self.buffer.lock().unwrap().clear();
                return Ok(());
            }

            if self.buffer.lock().unwrap().is_empty() {
                break;
            }
        }

        // コールバックが最後のブロックを出し終えるまでの余白
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    }

    /// 音声ストリームを停止
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
