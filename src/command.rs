/// 完了した転写から導出される離散コマンド
///
/// 1回の発話につき1つだけ導出される。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    NowPlaying,
    PlaySong(String),
    Stop,
    Pause,
    Resume,
    Next,
    Clear,
    SelfDestruct,
    Unrecognized,
}

/// 優先順位つきの解釈ルール
struct Rule {
    /// このルールが転写にマッチするか
    matches: fn(&str) -> bool,
    /// マッチした転写からコマンドを組み立てる
    ///
    /// `None` は「マッチしたが実行すべき動作がない」ことを表す
    /// （例: 曲名が空のplay）
    build: fn(&str) -> Option<Command>,
}

/// ルール表。上から順に評価し、最初にマッチしたものが勝つ。
/// 後続のルールのキーワードが含まれていても無視される。
static RULES: &[Rule] = &[
    Rule {
        matches: |t| t.contains("now") && t.contains("playing"),
        build: |_| Some(Command::NowPlaying),
    },
    Rule {
        // 音声認識が "play" を "played" と書き起こすことがある
        matches: |t| t.contains("played"),
        build: |t| strip_keyword(t, "played").map(Command::PlaySong),
    },
    Rule {
        matches: |t| t.contains("play"),
        build: |t| strip_keyword(t, "play").map(Command::PlaySong),
    },
    Rule {
        matches: |t| t.contains("stop"),
        build: |_| Some(Command::Stop),
    },
    Rule {
        matches: |t| t.contains("pause"),
        build: |_| Some(Command::Pause),
    },
    Rule {
        matches: |t| t.contains("resume"),
        build: |_| Some(Command::Resume),
    },
    Rule {
        matches: |t| t.contains("next"),
        build: |_| Some(Command::Next),
    },
    Rule {
        matches: |t| t.contains("clear"),
        build: |_| Some(Command::Clear),
    },
    Rule {
        matches: |t| {
            (t.contains("kill") && t.contains("self"))
                || (t.contains("self") && t.contains("destruct"))
        },
        build: |_| Some(Command::SelfDestruct),
    },
];

/// 転写から最初の `keyword` を取り除いて整形する。空になれば `None`
fn strip_keyword(transcript: &str, keyword: &str) -> Option<String> {
    let song = transcript.replacen(keyword, "", 1).trim().to_string();
    if song.is_empty() {
        None
    } else {
        Some(song)
    }
}

/// 完了した転写を1つのコマンドに解釈する
///
/// 小文字に正規化した転写に対し、ルール表を上から評価する。
/// どのルールにもマッチしなければ `Unrecognized`。
///
/// # Examples
///
/// ```
/// # use vibes_voice::command::{interpret, Command};
/// assert_eq!(interpret("now playing"), Some(Command::NowPlaying));
/// assert_eq!(
///     interpret("play bohemian rhapsody"),
///     Some(Command::PlaySong("bohemian rhapsody".to_string()))
/// );
/// assert_eq!(interpret("play"), None); // 曲名が空なら動作なし
/// ```
pub fn interpret(transcript: &str) -> Option<Command> {
    let normalized = transcript.to_lowercase();
    for rule in RULES {
        if (rule.matches)(&normalized) {
            return (rule.build)(&normalized);
        }
    }
    Some(Command::Unrecognized)
}
