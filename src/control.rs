use crate::audio_input::AudioStream;
use crate::command::{self, Command};
use crate::remote::RemoteCommandClient;
use crate::speech::AsyncSpeechOutput;
use crate::transcribe::Transcriber;
use crate::wake_word::WakeWordDetector;
use anyhow::Result;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 制御ループの状態
///
/// 状態はループ自身だけが書き換える。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlState {
    /// ウェイクワードを待っている
    WaitingForWake,
    /// 起動に応答している
    Acknowledging,
    /// 発話を聴取している
    Listening,
    /// 転写をコマンドに解釈している
    Interpreting,
    /// コマンドの副作用を実行している
    Dispatching,
    /// 終了状態。以降ウェイク検出は行わない
    Exiting,
}

/// 起動→聴取→解釈→応答を回す状態機械
///
/// 協調コンポーネントは起動時に一度だけ組み立てて、ここへ渡す。
/// モジュールレベルの可変状態は持たない。発話出力へは決して
/// ブロックせず（fire-and-forget）、ウェイク検出と聴取では
/// ブロックする。
pub struct ControlLoop<'a> {
    state: ControlState,
    wake: Box<dyn WakeWordDetector>,
    transcriber: Transcriber,
    speech: &'a AsyncSpeechOutput,
    remote: RemoteCommandClient,
    running: Arc<AtomicBool>,
    /// 直近の発話の転写。Interpretingに持ち越す
    transcript: String,
    /// 導出されたコマンド。Dispatchingに持ち越す
    command: Option<Command>,
}

impl<'a> ControlLoop<'a> {
    pub fn new(
        wake: Box<dyn WakeWordDetector>,
        transcriber: Transcriber,
        speech: &'a AsyncSpeechOutput,
        remote: RemoteCommandClient,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            state: ControlState::WaitingForWake,
            wake,
            transcriber,
            speech,
            remote,
            running,
            transcript: String::new(),
            command: None,
        }
    }

    /// 現在の状態
    pub fn state(&self) -> ControlState {
        self.state
    }

    /// 状態機械を終了状態まで回す
    pub async fn run(&mut self, stream: &mut AudioStream) -> Result<()> {
        loop {
            let next = match self.state {
                ControlState::WaitingForWake => self.waiting_for_wake(stream).await?,
                ControlState::Acknowledging => self.acknowledging(),
                ControlState::Listening => self.listening(stream).await,
                ControlState::Interpreting => self.interpreting(),
                ControlState::Dispatching => self.dispatching().await,
                ControlState::Exiting => break,
            };
            self.state = next;
        }
        Ok(())
    }

    async fn waiting_for_wake(&mut self, stream: &mut AudioStream) -> Result<ControlState> {
        if !self.running.load(Ordering::SeqCst) {
            return Ok(ControlState::Exiting);
        }

        println!("ウェイクワードを待機しています...");
        if self.wake.wait_for_wake_word(stream).await? {
            Ok(ControlState::Acknowledging)
        } else {
            // 停止要求
            Ok(ControlState::Exiting)
        }
    }

    fn acknowledging(&self) -> ControlState {
        // 前の応答が鳴り残っていれば打ち切る。キュー済みの発話は残る
        self.speech.interrupt();
        self.speech.speak_async("Yes???");
        ControlState::Listening
    }

    async fn listening(&mut self, stream: &mut AudioStream) -> ControlState {
        let mut transcript = String::new();

        let mut partials = self.transcriber.record_and_transcribe(stream);
        while let Some(partial) = partials.next_partial().await {
            // 伸びていく文を同じ行に上書き表示する
            print!("\r{}{}", partial, " ".repeat(20));
            let _ = std::io::stdout().flush();
            transcript = partial; // 最後の要素が発話全体の転写になる
        }
        println!();
        println!("You said: {}", transcript);

        self.transcript = transcript;
        ControlState::Interpreting
    }

    fn interpreting(&mut self) -> ControlState {
        self.command = command::interpret(&self.transcript);
        // 転写はコマンド導出後に破棄する
        self.transcript.clear();
        ControlState::Dispatching
    }

    async fn dispatching(&mut self) -> ControlState {
        match self.command.take() {
            Some(Command::NowPlaying) => {
                self.speech.speak_async("Now playing.");
                self.remote.send_command("now-playing").await;
            }
            Some(Command::PlaySong(song)) => {
                self.speech.speak_async(&format!("Playing {}", song));
                self.remote.send_play(&song).await;
            }
            Some(Command::Stop) => {
                self.speech.speak_async("Stopping.");
                self.remote.send_command("stop").await;
            }
            Some(Command::Pause) => {
                self.speech.speak_async("Pausing.");
                self.remote.send_command("pause").await;
            }
            Some(Command::Resume) => {
                self.speech.speak_async("Resuming.");
                self.remote.send_command("resume").await;
            }
            Some(Command::Next) => {
                self.speech.speak_async("Skipping.");
                self.remote.send_command("next").await;
            }
            Some(Command::Clear) => {
                self.speech.speak_async("Clearing.");
                self.remote.send_command("clear").await;
            }
            Some(Command::SelfDestruct) => {
                self.speech.speak_async("Goodbye.");
                return ControlState::Exiting;
            }
            Some(Command::Unrecognized) => {
                self.speech
                    .speak_async("Sorry, I didn't understand that command.");
            }
            None => {
                // マッチしたが動作なし（曲名が空のplayなど）
            }
        }
        ControlState::WaitingForWake
    }
}
