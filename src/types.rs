/// 16ビット整数型のオーディオサンプル
///
/// PCM形式の音声データを表現するための型エイリアス。
/// -32768 から 32767 の範囲の値を取る。
pub type SampleI16 = i16;

/// オーディオフォーマット情報
///
/// 音声データのサンプリングレートとチャンネル数を保持する。
///
/// # Examples
///
/// ```
/// # use vibes_voice::types::AudioFormat;
/// let format = AudioFormat {
///     sample_rate: 16000, // 16kHz
///     channels: 1,        // モノラル
/// };
/// ```
#[derive(Clone, Copy, Debug)]
pub struct AudioFormat {
    /// サンプリングレート (Hz)
    ///
    /// 典型的な値: 8000, 16000, 44100, 48000
    pub sample_rate: u32,

    /// チャンネル数
    ///
    /// 1: モノラル, 2: ステレオ
    pub channels: u16,
}

/// オーディオチャンク
///
/// タイムスタンプ付きの音声データのまとまり。
/// マイク入力ストリームから受信した生データを表現する。
///
/// # Examples
///
/// ```
/// # use vibes_voice::types::{AudioChunk, AudioFormat};
/// let chunk = AudioChunk {
///     samples: vec![0i16; 1600], // 100ms分 @ 16kHz
///     format: AudioFormat { sample_rate: 16000, channels: 1 },
///     timestamp_ns: 1_000_000_000, // 1秒
/// };
/// ```
#[derive(Clone, Debug)]
pub struct AudioChunk {
    /// PCM音声サンプルの配列
    pub samples: Vec<SampleI16>,

    /// オーディオフォーマット情報
    pub format: AudioFormat,

    /// このチャンクの開始タイムスタンプ (ナノ秒)
    ///
    /// UNIX_EPOCHからの経過時間
    pub timestamp_ns: u128,
}

impl AudioChunk {
    /// このチャンクの再生時間（ミリ秒）
    pub fn duration_ms(&self) -> u64 {
        if self.format.sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as u64 * 1000) / self.format.sample_rate as u64
    }
}

/// VAD（Voice Activity Detection）の状態
///
/// 音声検出器の現在の状態を表す。
/// ハングオーバー機構により、音声が途切れてもすぐには
/// 無音状態に遷移しない。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VadState {
    /// 無音状態
    Silence,

    /// 音声状態
    ///
    /// ハングオーバー残り時間（ミリ秒）を保持する。
    /// 音声が検出されなくなっても、この時間が経過するまでは
    /// 音声状態を維持する。
    Voice {
        /// ハングオーバー残り時間（ミリ秒）
        hangover_remaining_ms: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_format_creation() {
        let format = AudioFormat {
            sample_rate: 16000,
            channels: 1,
        };
        assert_eq!(format.sample_rate, 16000);
        assert_eq!(format.channels, 1);
    }

    #[test]
    fn test_audio_chunk_duration() {
        let chunk = AudioChunk {
            samples: vec![0i16; 1600],
            format: AudioFormat {
                sample_rate: 16000,
                channels: 1,
            },
            timestamp_ns: 1_000_000_000,
        };
        assert_eq!(chunk.samples.len(), 1600);
        assert_eq!(chunk.duration_ms(), 100);
    }

    #[test]
    fn test_vad_state_equality() {
        assert_eq!(VadState::Silence, VadState::Silence);
        assert_eq!(
            VadState::Voice {
                hangover_remaining_ms: 500
            },
            VadState::Voice {
                hangover_remaining_ms: 500
            }
        );
        assert_ne!(
            VadState::Silence,
            VadState::Voice {
                hangover_remaining_ms: 500
            }
        );
    }
}
