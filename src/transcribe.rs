use crate::audio_input::AudioStream;
use crate::config::{TranscribeConfig, VadConfig};
use crate::transcribe_backend::TranscribeBackend;
use crate::types::SampleI16;
use crate::vad::VoiceActivityDetector;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 発話の捕捉と文字起こし
///
/// 1回の呼び出しで1発話分の遅延シーケンスを生成する。
/// 発話の切り出しはVADに任せ、転写はバックエンドに委譲する。
pub struct Transcriber {
    backend: Box<dyn TranscribeBackend>,
    vad_config: VadConfig,
    sample_rate: u32,
    partial_interval_ms: u64,
    listen_timeout_ms: u64,
    running: Arc<AtomicBool>,
}

impl Transcriber {
    pub fn new(
        backend: Box<dyn TranscribeBackend>,
        vad_config: VadConfig,
        config: &TranscribeConfig,
        sample_rate: u32,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            backend,
            vad_config,
            sample_rate,
            partial_interval_ms: config.partial_interval_ms,
            listen_timeout_ms: config.listen_timeout_ms,
            running,
        }
    }

    /// 1回の発話を捕捉し、部分転写の遅延シーケンスを返す
    ///
    /// 呼び出しごとに新しいシーケンスが始まる。シーケンスは有限で、
    /// 最後の要素が発話全体の転写になる。
    pub fn record_and_transcribe<'a>(&'a self, stream: &'a mut AudioStream) -> UtteranceStream<'a> {
        UtteranceStream {
            backend: self.backend.as_ref(),
            stream,
            vad: VoiceActivityDetector::new(&self.vad_config, self.sample_rate),
            pending: Vec::new(),
            text: String::new(),
            started: false,
            finished: false,
            consumed_ms: 0,
            pending_ms: 0,
            partial_interval_ms: self.partial_interval_ms,
            listen_timeout_ms: self.listen_timeout_ms,
            running: self.running.clone(),
        }
    }
}

/// 1発話分の部分転写シーケンス
///
/// `next_partial()` を繰り返し呼ぶと、伸びていく転写仮説が順に得られる。
/// 各要素は直前の要素の続きで、発話終端に達すると `None` を返す。
/// ループ停止要求が来た場合も早めに打ち切る。
pub struct UtteranceStream<'a> {
    backend: &'a dyn TranscribeBackend,
    stream: &'a mut AudioStream,
    vad: VoiceActivityDetector,
    /// まだ転写していないサンプル
    pending: Vec<SampleI16>,
    /// ここまでの転写テキスト
    text: String,
    started: bool,
    finished: bool,
    /// 消費した音声時間（ミリ秒）。壁時計ではなくサンプル数基準
    consumed_ms: u64,
    pending_ms: u64,
    partial_interval_ms: u64,
    listen_timeout_ms: u64,
    running: Arc<AtomicBool>,
}

impl UtteranceStream<'_> {
    /// 次の部分転写を返す。発話が終わったら `None`
    pub async fn next_partial(&mut self) -> Option<String> {
        if self.finished {
            return None;
        }

        loop {
            if !self.running.load(Ordering::SeqCst) {
                // ループ停止要求。いま持っている分で打ち切る
                return self.finalize().await;
            }

            let chunk = match self.stream.next_chunk().await {
                Some(chunk) => chunk,
                None => return self.finalize().await, // 入力ストリーム停止
            };

            let chunk_ms = chunk.duration_ms();
            let is_voice = self.vad.process(&chunk.samples);
            self.consumed_ms += chunk_ms;

            if is_voice && !self.started {
                self.started = true;
                log::debug!("発話開始を検出");
            }

            if self.started {
                self.pending.extend_from_slice(&chunk.samples);
                self.pending_ms += chunk_ms;

                if !is_voice {
                    // ハングオーバー分の無音が続いた。発話終端
                    log::debug!("発話終端を検出");
                    return self.finalize().await;
                }

                if self.pending_ms >= self.partial_interval_ms {
                    if let Some(partial) = self.transcribe_pending().await {
                        return Some(partial);
                    }
                    // 転写失敗か空の結果。次のチャンクで続行
                }
            } else if self.consumed_ms >= self.listen_timeout_ms {
                log::debug!("発話が始まらないため聴取を打ち切ります");
                self.finished = true;
                return None;
            }
        }
    }

    /// 残りを転写してシーケンスを終える
    ///
    /// 最後の要素として発話全体の転写を返す。何も捕捉して
    /// いなければ要素なしで終わる。
    async fn finalize(&mut self) -> Option<String> {
        self.finished = true;
        self.transcribe_pending().await;
        if self.text.is_empty() {
            None
        } else {
            Some(self.text.clone())
        }
    }

    /// 未転写のサンプルを転写し、累積テキストに足し込む
    ///
    /// 転写に失敗した区間はログを出して読み飛ばす。致命的にはしない。
    async fn transcribe_pending(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }

        let segment = std::mem::take(&mut self.pending);
        self.pending_ms = 0;

        match self.backend.transcribe(&segment).await {
            Ok(segment_text) => {
                let segment_text = segment_text.trim();
                if segment_text.is_empty() {
                    return None;
                }
                if !self.text.is_empty() {
                    self.text.push(' ');
                }
                self.text.push_str(segment_text);
                Some(self.text.clone())
            }
            Err(e) => {
                log::error!("区間の転写に失敗: {:#}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AudioChunk, AudioFormat};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// 呼ばれるたびに用意されたテキストを順に返すバックエンド
    struct ScriptedBackend {
        texts: Mutex<Vec<String>>,
        calls: Arc<Mutex<usize>>,
    }

    impl ScriptedBackend {
        fn new(texts: &[&str]) -> (Box<Self>, Arc<Mutex<usize>>) {
            let calls = Arc::new(Mutex::new(0));
            let backend = Box::new(Self {
                texts: Mutex::new(texts.iter().rev().map(|s| s.to_string()).collect()),
                calls: calls.clone(),
            });
            (backend, calls)
        }
    }

    #[async_trait]
    impl TranscribeBackend for ScriptedBackend {
        async fn transcribe(&self, _pcm: &[SampleI16]) -> Result<String> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.texts.lock().unwrap().pop().unwrap_or_default())
        }
    }

    fn chunk(samples: Vec<i16>) -> AudioChunk {
        AudioChunk {
            samples,
            format: AudioFormat {
                sample_rate: 16000,
                channels: 1,
            },
            timestamp_ns: 0,
        }
    }

    fn voiced_chunk() -> AudioChunk {
        // 100ms分の音声サンプル
        chunk(
            (0..1600)
                .map(|i| ((i as f32 * 0.1).sin() * 10000.0) as i16)
                .collect(),
        )
    }

    fn silence_chunk() -> AudioChunk {
        chunk(vec![0i16; 1600]) // 100ms分の無音
    }

    fn transcriber(
        backend: Box<dyn TranscribeBackend>,
        partial_interval_ms: u64,
        listen_timeout_ms: u64,
    ) -> Transcriber {
        let vad_config = VadConfig {
            threshold_db: -40.0,
            hangover_duration_ms: 500,
        };
        let config = TranscribeConfig {
            partial_interval_ms,
            listen_timeout_ms,
            ..TranscribeConfig::default()
        };
        Transcriber::new(
            backend,
            vad_config,
            &config,
            16000,
            Arc::new(AtomicBool::new(true)),
        )
    }

    #[tokio::test]
    async fn test_final_transcript_on_endpoint() {
        let (backend, calls) = ScriptedBackend::new(&["hello"]);
        let transcriber = transcriber(backend, 5000, 10000);

        let (tx, rx) = mpsc::channel(64);
        let mut stream = AudioStream::from_receiver(rx);

        // 400msの発話のあと、ハングオーバーを超える無音
        for _ in 0..4 {
            tx.send(voiced_chunk()).await.unwrap();
        }
        for _ in 0..6 {
            tx.send(silence_chunk()).await.unwrap();
        }

        let mut partials = transcriber.record_and_transcribe(&mut stream);
        assert_eq!(partials.next_partial().await.as_deref(), Some("hello"));
        assert!(partials.next_partial().await.is_none());
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_growing_partials() {
        let (backend, _calls) = ScriptedBackend::new(&["hello", "world", ""]);
        let transcriber = transcriber(backend, 200, 10000);

        let (tx, rx) = mpsc::channel(64);
        let mut stream = AudioStream::from_receiver(rx);

        for _ in 0..4 {
            tx.send(voiced_chunk()).await.unwrap();
        }
        for _ in 0..6 {
            tx.send(silence_chunk()).await.unwrap();
        }

        let mut partials = transcriber.record_and_transcribe(&mut stream);

        // 各要素は直前の要素の続きになる
        assert_eq!(partials.next_partial().await.as_deref(), Some("hello"));
        assert_eq!(
            partials.next_partial().await.as_deref(),
            Some("hello world")
        );
        // 発話終端。最後の要素は発話全体の転写
        assert_eq!(
            partials.next_partial().await.as_deref(),
            Some("hello world")
        );
        assert!(partials.next_partial().await.is_none());
    }

    #[tokio::test]
    async fn test_listen_timeout_without_speech() {
        let (backend, calls) = ScriptedBackend::new(&["should not be called"]);
        let transcriber = transcriber(backend, 1000, 500);

        let (tx, rx) = mpsc::channel(64);
        let mut stream = AudioStream::from_receiver(rx);

        // 無音だけが続く
        for _ in 0..7 {
            tx.send(silence_chunk()).await.unwrap();
        }

        let mut partials = transcriber.record_and_transcribe(&mut stream);
        assert!(partials.next_partial().await.is_none());
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stream_closed_mid_utterance() {
        let (backend, _calls) = ScriptedBackend::new(&["partial words"]);
        let transcriber = transcriber(backend, 5000, 10000);

        let (tx, rx) = mpsc::channel(64);
        let mut stream = AudioStream::from_receiver(rx);

        for _ in 0..3 {
            tx.send(voiced_chunk()).await.unwrap();
        }
        drop(tx); // 入力ストリームが停止した

        let mut partials = transcriber.record_and_transcribe(&mut stream);
        assert_eq!(
            partials.next_partial().await.as_deref(),
            Some("partial words")
        );
        assert!(partials.next_partial().await.is_none());
    }

    #[tokio::test]
    async fn test_stop_request_cancels_listening() {
        let (backend, calls) = ScriptedBackend::new(&[]);
        let vad_config = VadConfig {
            threshold_db: -40.0,
            hangover_duration_ms: 500,
        };
        let config = TranscribeConfig::default();
        let running = Arc::new(AtomicBool::new(false)); // 最初から停止要求
        let transcriber = Transcriber::new(backend, vad_config, &config, 16000, running);

        let (_tx, rx) = mpsc::channel::<AudioChunk>(4);
        let mut stream = AudioStream::from_receiver(rx);

        let mut partials = transcriber.record_and_transcribe(&mut stream);
        assert!(partials.next_partial().await.is_none());
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_segment_is_skipped() {
        // 1回目の転写が失敗しても、シーケンスは継続する
        struct FailingBackend {
            calls: Arc<Mutex<usize>>,
        }

        #[async_trait]
        impl TranscribeBackend for FailingBackend {
            async fn transcribe(&self, _pcm: &[SampleI16]) -> Result<String> {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                match *calls {
                    1 => anyhow::bail!("一時的なエラー"),
                    2 => Ok("recovered".to_string()),
                    _ => Ok(String::new()),
                }
            }
        }

        let calls = Arc::new(Mutex::new(0));
        let backend = Box::new(FailingBackend {
            calls: calls.clone(),
        });
        let transcriber = transcriber(backend, 200, 10000);

        let (tx, rx) = mpsc::channel(64);
        let mut stream = AudioStream::from_receiver(rx);

        for _ in 0..4 {
            tx.send(voiced_chunk()).await.unwrap();
        }
        for _ in 0..6 {
            tx.send(silence_chunk()).await.unwrap();
        }

        let mut partials = transcriber.record_and_transcribe(&mut stream);
        assert_eq!(partials.next_partial().await.as_deref(), Some("recovered"));
        // 終端で最後の要素として発話全体の転写が返る
        assert_eq!(partials.next_partial().await.as_deref(), Some("recovered"));
        assert!(partials.next_partial().await.is_none());
        assert!(*calls.lock().unwrap() >= 2);
    }
}
