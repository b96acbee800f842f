use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// 発話中断フラグ
///
/// 制御ループとワーカー、音声エンジンの間で共有される。
/// 立てると「いま鳴っている発話」だけが打ち切られる。
#[derive(Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 音声合成エンジンの共通トレイト
///
/// 1件のテキストを合成して最後まで再生する。
/// 再生中に `interrupt` が立てられたら速やかに切り上げて戻ること。
#[async_trait]
pub trait SpeechEngine: Send {
    async fn vocalize(&mut self, text: &str, interrupt: &InterruptFlag) -> Result<()>;
}

/// 発話キューに入るジョブ
///
/// 停止指示は本文と紛れない専用のバリアントで表す。
enum SpeechJob {
    Utterance(String),
    Shutdown,
}

/// 非同期・中断可能な発話出力
///
/// 発話リクエストをFIFOキューに積み、専用ワーカータスク1つが
/// 順番に、1件ずつ最後まで発話する。呼び出し側は決してブロックしない。
///
/// # Examples
///
/// ```no_run
/// # use vibes_voice::speech::{AsyncSpeechOutput, SpeechEngine};
/// # async fn demo(engine: Box<dyn SpeechEngine>) {
/// let mut speech = AsyncSpeechOutput::spawn(engine);
/// speech.speak_async("Yes???");
/// speech.interrupt();
/// speech.shutdown().await;
/// # }
/// ```
pub struct AsyncSpeechOutput {
    tx: mpsc::UnboundedSender<SpeechJob>,
    interrupt: InterruptFlag,
    worker: Option<JoinHandle<()>>,
}

impl AsyncSpeechOutput {
    /// ワーカータスクを起動する
    pub fn spawn(engine: Box<dyn SpeechEngine>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<SpeechJob>();
        let interrupt = InterruptFlag::new();
        let worker_interrupt = interrupt.clone();

        let worker = tokio::spawn(async move {
            let mut engine = engine;
            while let Some(job) = rx.recv().await {
                match job {
                    SpeechJob::Utterance(text) => {
                        // 中断は「鳴っている発話」への指示。次の発話には持ち越さない
                        worker_interrupt.clear();
                        if let Err(e) = engine.vocalize(&text, &worker_interrupt).await {
                            log::error!("発話に失敗: {:#}", e);
                        }
                    }
                    SpeechJob::Shutdown => break,
                }
            }
            log::debug!("発話ワーカーを終了します");
        });

        Self {
            tx,
            interrupt,
            worker: Some(worker),
        }
    }

    /// テキストを発話キューに追加して即座に戻る
    ///
    /// どの状態からでも呼んでよい。シャットダウン後は黙って無視される。
    pub fn speak_async(&self, text: &str) {
        let _ = self.tx.send(SpeechJob::Utterance(text.to_string()));
    }

    /// いま鳴っている発話を中断する
    ///
    /// キューに積まれた未開始の発話は取り除かない。
    /// 中断後もそれらは元の順序で発話される。
    pub fn interrupt(&self) {
        self.interrupt.raise();
    }

    /// 停止指示をキューに積み、ワーカーの終了を待つ
    ///
    /// 停止指示より前に積まれた発話はすべて発話されてから終了する。
    /// プロセスごとに一度だけ呼ぶこと。
    pub async fn shutdown(&mut self) {
        let _ = self.tx.send(SpeechJob::Shutdown);
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                log::error!("発話ワーカーの終了待ちに失敗: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// テスト用エンジン
    ///
    /// 発話の開始と終了を記録する。`release` から許可が来るか、
    /// 中断フラグが立つまで発話し続ける。
    struct MockEngine {
        log: Arc<Mutex<Vec<String>>>,
        release: mpsc::Receiver<()>,
    }

    #[async_trait]
    impl SpeechEngine for MockEngine {
        async fn vocalize(&mut self, text: &str, interrupt: &InterruptFlag) -> Result<()> {
            self.log.lock().unwrap().push(format!("start {}", text));
            loop {
                if interrupt.is_raised() {
                    self.log.lock().unwrap().push(format!("interrupted {}", text));
                    return Ok(());
                }
                match tokio::time::timeout(Duration::from_millis(5), self.release.recv()).await {
                    Ok(_) => {
                        self.log.lock().unwrap().push(format!("end {}", text));
                        return Ok(());
                    }
                    Err(_) => {} // タイムアウト。中断フラグを見直す
                }
            }
        }
    }

    fn mock_engine() -> (Box<MockEngine>, Arc<Mutex<Vec<String>>>, mpsc::Sender<()>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (release_tx, release_rx) = mpsc::channel(64);
        let engine = Box::new(MockEngine {
            log: log.clone(),
            release: release_rx,
        });
        (engine, log, release_tx)
    }

    async fn wait_until<F: Fn(&[String]) -> bool>(log: &Arc<Mutex<Vec<String>>>, pred: F) {
        for _ in 0..500 {
            if pred(&log.lock().unwrap()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("条件が満たされないままタイムアウト: {:?}", log.lock().unwrap());
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (engine, log, release) = mock_engine();
        let mut speech = AsyncSpeechOutput::spawn(engine);

        // 発話許可を先に積んでおく（各発話は即座に完了する）
        for _ in 0..3 {
            release.send(()).await.unwrap();
        }

        speech.speak_async("A");
        speech.speak_async("B");
        speech.speak_async("C");
        speech.shutdown().await;

        // 積んだ順に、1件ずつ完了してから次が始まる
        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec!["start A", "end A", "start B", "end B", "start C", "end C"]
        );
    }

    #[tokio::test]
    async fn test_interrupt_cuts_current_but_keeps_queued() {
        let (engine, log, release) = mock_engine();
        let mut speech = AsyncSpeechOutput::spawn(engine);

        speech.speak_async("U");
        speech.speak_async("V");

        // Uの発話が始まるのを待ってから中断する
        wait_until(&log, |l| l.iter().any(|e| e == "start U")).await;
        speech.interrupt();

        // Uは打ち切られるが、中断前に積まれたVはそのまま発話される
        wait_until(&log, |l| l.iter().any(|e| e == "start V")).await;
        release.send(()).await.unwrap();
        speech.shutdown().await;

        let log = log.lock().unwrap();
        assert_eq!(*log, vec!["start U", "interrupted U", "start V", "end V"]);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue_then_stops() {
        let (engine, log, release) = mock_engine();
        let mut speech = AsyncSpeechOutput::spawn(engine);

        for _ in 0..2 {
            release.send(()).await.unwrap();
        }

        speech.speak_async("A");
        speech.speak_async("B");

        // 停止指示より前に積まれた発話は失われない
        speech.shutdown().await;
        assert_eq!(
            *log.lock().unwrap(),
            vec!["start A", "end A", "start B", "end B"]
        );

        // 終了後の発話リクエストは無視される
        speech.speak_async("C");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!log.lock().unwrap().iter().any(|e| e == "start C"));
    }
}
