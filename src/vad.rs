use crate::config::VadConfig;
use crate::types::{SampleI16, VadState};

/// Voice Activity Detector (音声区間検出器)
///
/// RMS (Root Mean Square) ベースのシンプルなVAD実装。
/// 音声パワーが閾値を超えたら音声区間と判定し、
/// 下回ってもハングオーバー期間は音声継続とみなす。
///
/// この構成ではハングオーバー期間が発話終端の判定を兼ねる。
/// 発話開始後に `process()` が false を返した時点で、
/// ハングオーバー分の無音が続いたことになり、発話は終了と扱える。
///
/// # Examples
///
/// ```
/// # use vibes_voice::vad::VoiceActivityDetector;
/// # use vibes_voice::config::VadConfig;
/// let config = VadConfig {
///     threshold_db: -40.0,
///     hangover_duration_ms: 500,
/// };
/// let mut vad = VoiceActivityDetector::new(&config, 16000);
///
/// // 無音サンプル
/// let silence = vec![0i16; 1600];
/// assert!(!vad.process(&silence));
///
/// // 音声サンプル
/// let voice: Vec<i16> = (0..1600)
///     .map(|i| ((i as f32 * 0.1).sin() * 10000.0) as i16)
///     .collect();
/// assert!(vad.process(&voice));
/// ```
pub struct VoiceActivityDetector {
    /// 音声判定の閾値 (dB)
    threshold_db: f32,

    /// ハングオーバー期間 (ミリ秒)
    ///
    /// 音声終了後もこの期間は音声状態を維持する
    hangover_duration_ms: u32,

    /// 現在の状態 (無音/音声)
    state: VadState,

    /// サンプリングレート (Hz)。時間計算に使用
    sample_rate: u32,
}

impl VoiceActivityDetector {
    pub fn new(config: &VadConfig, sample_rate: u32) -> Self {
        Self {
            threshold_db: config.threshold_db,
            hangover_duration_ms: config.hangover_duration_ms,
            state: VadState::Silence,
            sample_rate,
        }
    }

    /// 音声サンプルを処理して音声区間かどうかを判定
    ///
    /// # Returns
    /// * `true` - 音声あり（ハングオーバー中を含む）
    /// * `false` - 無音
    pub fn process(&mut self, samples: &[SampleI16]) -> bool {
        if samples.is_empty() {
            return matches!(self.state, VadState::Voice { .. });
        }

        let rms = self.calculate_rms(samples);
        let db = self.rms_to_db(rms);

        // サンプル数から経過時間を計算（ミリ秒）
        let duration_ms = (samples.len() as f64 / self.sample_rate as f64 * 1000.0) as u32;

        let is_voice_detected = db > self.threshold_db;

        self.state = match self.state {
            VadState::Silence => {
                if is_voice_detected {
                    log::debug!("VAD: 音声開始検出 (RMS: {:.2} dB)", db);
                    VadState::Voice {
                        hangover_remaining_ms: self.hangover_duration_ms,
                    }
                } else {
                    VadState::Silence
                }
            }
            VadState::Voice {
                hangover_remaining_ms,
            } => {
                if is_voice_detected {
                    // 音声が継続している間はハングオーバーをリセット
                    VadState::Voice {
                        hangover_remaining_ms: self.hangover_duration_ms,
                    }
                } else if hangover_remaining_ms > duration_ms {
                    VadState::Voice {
                        hangover_remaining_ms: hangover_remaining_ms - duration_ms,
                    }
                } else {
                    log::debug!("VAD: 音声終了検出 (RMS: {:.2} dB)", db);
                    VadState::Silence
                }
            }
        };

        matches!(self.state, VadState::Voice { .. })
    }

    /// RMS (Root Mean Square) を計算
    fn calculate_rms(&self, samples: &[SampleI16]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }

        let sum_of_squares: f64 = samples
            .iter()
            .map(|&s| {
                let normalized = s as f64 / i16::MAX as f64;
                normalized * normalized
            })
            .sum();

        let mean_square = sum_of_squares / samples.len() as f64;
        mean_square.sqrt() as f32
    }

    /// RMSをデシベル (dB) に変換
    fn rms_to_db(&self, rms: f32) -> f32 {
        if rms <= 0.0 {
            return -100.0; // 無音の場合の最小値
        }
        20.0 * rms.log10()
    }

    /// 現在の状態を取得
    pub fn state(&self) -> VadState {
        self.state
    }

    /// 音声区間中かどうか
    pub fn is_voice(&self) -> bool {
        matches!(self.state, VadState::Voice { .. })
    }
}
