/// Key layout for the Fjall `tasks` partition
///
/// - `tasks`: task:{uuid} -> Task (JSON)
use uuid::Uuid;

const TASK_PREFIX: &str = "task:";

/// Encode a task key: task:{id}
pub fn encode_task_key(id: Uuid) -> Vec<u8> {
    format!("{TASK_PREFIX}{id}").into_bytes()
}

/// Decode a task key: task:{id} -> id
pub fn decode_task_key(key: &[u8]) -> Option<Uuid> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix(TASK_PREFIX)?.parse().ok()
}
