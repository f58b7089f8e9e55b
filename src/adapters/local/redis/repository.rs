//! Redis JobRepository implementation.
//!
//! Each job is a hash with a `stage` field next to the JSON `payload`, so
//! the Lua scripts can compare stages without decoding the job.

use super::error::RedisAdapterError;
use super::job_key;
use super::pool::RedisPool;
use crate::domain::jobs::{Job, JobId, JobStage};
use crate::ports::repository::{JobRepository, RepositoryError};
use async_trait::async_trait;
use deadpool_redis::redis::{AsyncCommands, Script};

const INSERT_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1], 'stage', ARGV[1], 'payload', ARGV[2])
return 1
"#;

const SAVE_IF_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'stage') ~= ARGV[1] then
    return 0
end
redis.call('HSET', KEYS[1], 'stage', ARGV[2], 'payload', ARGV[3])
return 1
"#;

#[async_trait]
impl JobRepository for RedisPool {
    async fn insert(&self, job: &Job) -> Result<(), RepositoryError> {
        let payload = serde_json::to_string(job)?;
        let mut conn = self.connection().await?;
        let inserted: i32 = Script::new(INSERT_SCRIPT)
            .key(job_key(job.id))
            .arg(job.stage.as_str())
            .arg(payload)
            .invoke_async(&mut conn)
            .await
            .map_err(RedisAdapterError::from)?;
        if inserted == 0 {
            return Err(RepositoryError::Duplicate(job.id));
        }
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, RepositoryError> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn
            .hget(job_key(id), "payload")
            .await
            .map_err(RedisAdapterError::from)?;
        match payload {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn save_if(&self, job: &Job, expected: JobStage) -> Result<bool, RepositoryError> {
        let payload = serde_json::to_string(job)?;
        let mut conn = self.connection().await?;
        let saved: i32 = Script::new(SAVE_IF_SCRIPT)
            .key(job_key(job.id))
            .arg(expected.as_str())
            .arg(job.stage.as_str())
            .arg(payload)
            .invoke_async(&mut conn)
            .await
            .map_err(RedisAdapterError::from)?;
        Ok(saved == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_are_loadable() {
        let insert = Script::new(INSERT_SCRIPT);
        let save_if = Script::new(SAVE_IF_SCRIPT);
        // EVALSHA addresses scripts by their SHA1
        assert_eq!(insert.get_hash().len(), 40);
        assert_ne!(insert.get_hash(), save_if.get_hash());
    }

    #[test]
    fn test_job_keys_are_namespaced() {
        let id = JobId::new();
        assert_eq!(job_key(id), format!("videogen:job:{}", id));
    }
}
