use anyhow::Result;
use env_logger::Env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use vibes_voice::audio_input::AudioInput;
use vibes_voice::config::Config;
use vibes_voice::control::ControlLoop;
use vibes_voice::openai_tts::OpenAiTtsEngine;
use vibes_voice::remote::RemoteCommandClient;
use vibes_voice::speech::AsyncSpeechOutput;
use vibes_voice::transcribe::Transcriber;
use vibes_voice::wake_word::RustpotterDetector;
use vibes_voice::whisper_api::WhisperBackend;

#[tokio::main]
async fn main() -> Result<()> {
    // ロガーを初期化
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    // コマンドライン引数をパース
    let args: Vec<String> = std::env::args().collect();

    // デバイス一覧表示モード
    if args.len() > 1 && args[1] == "--show-interfaces" {
        AudioInput::list_devices()?;
        return Ok(());
    }

    // 設定ファイル生成モード
    if args.len() > 1 && args[1] == "--generate-config" {
        let config_path = if args.len() > 2 {
            &args[2]
        } else {
            "config.toml"
        };
        Config::write_default(config_path)?;
        println!("設定ファイルを生成しました: {}", config_path);
        return Ok(());
    }

    // 設定ファイルのパス
    let config_path = if args.len() > 1 && !args[1].starts_with("--") {
        &args[1]
    } else {
        "config.toml"
    };

    // 設定を読み込み、環境変数で上書き
    let mut config = Config::load_or_default(config_path)?;
    config.apply_env_overrides();

    log::info!("vibes-voice を起動します");

    // Ctrl+C で停止フラグを立てる
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    ctrlc::set_handler(move || {
        log::info!("停止シグナルを受信しました...");
        running_clone.store(false, Ordering::SeqCst);
    })?;

    // 共有マイクストリーム。プロセスでこの1本だけを開く
    let mut audio_input = AudioInput::new(&config.audio)?;
    let mut stream = audio_input.start()?;

    // 発話ワーカー（制御ループと並走するもう1つの実行単位）
    let engine = OpenAiTtsEngine::new(config.speech.clone())?;
    let mut speech = AsyncSpeechOutput::spawn(Box::new(engine));

    let wake = RustpotterDetector::new(&config.wake, config.audio.sample_rate, running.clone())?;
    let backend = WhisperBackend::new(config.transcribe.clone(), config.audio.sample_rate)?;
    let transcriber = Transcriber::new(
        Box::new(backend),
        config.vad.clone(),
        &config.transcribe,
        config.audio.sample_rate,
        running.clone(),
    );
    let remote = RemoteCommandClient::new(&config.remote)?;

    println!("========================================");
    println!("         VIBES VOICE ASSISTANT          ");
    println!("========================================");
    println!();

    let mut control = ControlLoop::new(Box::new(wake), transcriber, &speech, remote, running);
    let loop_result = control.run(&mut stream).await;
    drop(control);

    // ループの結果に関わらず後始末は必ず実行する
    audio_input.stop();
    speech.shutdown().await;

    log::info!("vibes-voice を終了しました");

    loop_result
}
