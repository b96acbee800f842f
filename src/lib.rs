//! vibes-voice - 音声で操作するリモコン型フロントエンド
//!
//! このクレートは、起動フレーズを待ち受けて発話を文字起こしし、
//! 小さなコマンド文法に照合して、リモートの音楽制御サービス
//! (vibesbot) へ対応する操作を送信するシステムを提供します。
//!
//! # 主な機能
//!
//! - **ウェイクワード検出**: rustpotterによる起動フレーズの待ち受け
//! - **発話の文字起こし**: VADで発話区間を切り出し、Whisper APIで転写
//! - **コマンド解釈**: 優先順位つきキーワードルールによる first-match-wins 照合
//! - **割り込み可能な音声応答**: FIFOキュー + 専用ワーカーによる非同期発話
//! - **リモート送信**: 音楽サービスへのHTTP/JSONコマンド送信
//!
//! # アーキテクチャ
//!
//! ```text
//! [Microphone] → [AudioInput] → [AudioStream] ──┬→ [WakeWordDetector]
//!                                               └→ [Transcriber] → [CommandDispatcher]
//!                                                                        ↓
//!                                  [ControlLoop] ←──────────────────────┘
//!                                    ↓         ↓
//!                          [AsyncSpeechOutput] [RemoteCommandClient]
//!                                    ↓               ↓
//!                               [Speaker]       [vibesbot]
//! ```
//!
//! 実行単位は2つだけ: 制御ループ（メインタスク）と発話ワーカー。
//! マイクストリームはプロセスに1本で、ウェイク検出と文字起こしが
//! 交互に消費する（同時には読まない）。
//!
//! # 使用例
//!
//! ```no_run
//! use vibes_voice::config::Config;
//!
//! // 設定ファイルを読み込み
//! let config = Config::load_or_default("config.toml").unwrap();
//!
//! // またはデフォルト設定を生成
//! Config::write_default("config.toml").unwrap();
//! ```

pub mod audio_input;
pub mod audio_output;
pub mod command;
pub mod config;
pub mod control;
pub mod openai_tts;
pub mod remote;
pub mod speech;
pub mod transcribe;
pub mod transcribe_backend;
pub mod types;
pub mod vad;
pub mod wake_word;
pub mod whisper_api;
