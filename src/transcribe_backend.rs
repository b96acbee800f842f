use crate::types::SampleI16;
use anyhow::Result;
use async_trait::async_trait;

/// 文字起こしバックエンドの共通トレイト
///
/// 発話1区間分のPCMサンプル（モノラルi16）を受け取り、
/// 転写テキストを返す。区間の切り出しは呼び出し側の責務。
#[async_trait]
pub trait TranscribeBackend: Send + Sync {
    async fn transcribe(&self, pcm: &[SampleI16]) -> Result<String>;
}
