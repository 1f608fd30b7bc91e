use crate::config::MLConfig;
use crate::error::{RankError, RankResult};
use crate::ml::sentiment::{ModelArtifact, SentimentModel};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, warn};

/// Loads and verifies the sentiment model artifact at startup
pub struct ModelLoader {
    model_path: PathBuf,
    expected_sha256: Option<String>,
}

impl ModelLoader {
    /// Create a new model loader from configuration
    pub fn new(config: &MLConfig) -> Self {
        Self {
            model_path: PathBuf::from(&config.model_path),
            expected_sha256: config.model_sha256.clone(),
        }
    }

    /// Read, verify and parse the model. Any failure here must stop the service.
    pub async fn load(&self) -> RankResult<SentimentModel> {
        info!("Loading sentiment model from {}", self.model_path.display());

        let bytes = fs::read(&self.model_path).await.map_err(|e| {
            error!("Failed to read model {}: {}", self.model_path.display(), e);
            RankError::ModelError(format!(
                "Failed to read model {}: {}",
                self.model_path.display(),
                e
            ))
        })?;

        match &self.expected_sha256 {
            Some(expected) => {
                if !verify_digest(&bytes, expected) {
                    return Err(RankError::ModelError(format!(
                        "Model {} has incorrect SHA256 hash. Expected: {}, refusing to serve with a corrupted model.",
                        self.model_path.display(),
                        expected
                    )));
                }
                info!("Model checksum verified");
            }
            None => warn!("MODEL_SHA256 not set, skipping model checksum verification"),
        }

        let artifact: ModelArtifact = serde_json::from_slice(&bytes)
            .map_err(|e| RankError::ModelError(format!("Invalid model artifact: {}", e)))?;

        let model = SentimentModel::from_artifact(artifact)?;
        info!(
            "Sentiment model loaded (version {}, {} tokens)",
            model.version(),
            model.vocabulary_size()
        );
        Ok(model)
    }

    /// Verify that a model file exists and has the expected hash
    pub async fn verify_model(path: &Path, expected_hash: &str) -> RankResult<bool> {
        if !path.exists() {
            return Ok(false);
        }

        let bytes = fs::read(path).await?;
        Ok(verify_digest(&bytes, expected_hash))
    }
}

/// Hex-encoded SHA256 of the given bytes
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn verify_digest(bytes: &[u8], expected_hash: &str) -> bool {
    sha256_hex(bytes).eq_ignore_ascii_case(expected_hash.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ARTIFACT: &str = r#"{
        "name": "test-lexicon",
        "version": "0.1.0",
        "weights": {"great": 2.0, "awful": -2.0}
    }"#;

    fn ml_config(path: &Path, sha: Option<String>) -> MLConfig {
        MLConfig {
            model_path: path.display().to_string(),
            model_sha256: sha,
            max_text_length: 5000,
        }
    }

    #[tokio::test]
    async fn test_load_valid_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let model_path = temp_dir.path().join("model.json");
        std::fs::write(&model_path, ARTIFACT).unwrap();

        let loader = ModelLoader::new(&ml_config(&model_path, None));
        let model = loader.load().await.unwrap();
        assert_eq!(model.version(), "0.1.0");
        assert_eq!(model.vocabulary_size(), 2);
    }

    #[tokio::test]
    async fn test_load_verifies_checksum() {
        let temp_dir = TempDir::new().unwrap();
        let model_path = temp_dir.path().join("model.json");
        std::fs::write(&model_path, ARTIFACT).unwrap();

        let good = sha256_hex(ARTIFACT.as_bytes()).to_uppercase();
        let loader = ModelLoader::new(&ml_config(&model_path, Some(good)));
        assert!(loader.load().await.is_ok());

        let wrong = "0".repeat(64);
        let loader = ModelLoader::new(&ml_config(&model_path, Some(wrong)));
        let err = loader.load().await.unwrap_err();
        assert!(matches!(err, RankError::ModelError(_)));
    }

    #[tokio::test]
    async fn test_missing_model_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let loader = ModelLoader::new(&ml_config(&temp_dir.path().join("absent.json"), None));
        assert!(matches!(loader.load().await, Err(RankError::ModelError(_))));
    }

    #[tokio::test]
    async fn test_malformed_artifact_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let model_path = temp_dir.path().join("model.json");
        std::fs::write(&model_path, "{not json").unwrap();

        let loader = ModelLoader::new(&ml_config(&model_path, None));
        assert!(matches!(loader.load().await, Err(RankError::ModelError(_))));
    }

    #[tokio::test]
    async fn test_verify_model() {
        let temp_dir = TempDir::new().unwrap();
        let model_path = temp_dir.path().join("model.json");
        std::fs::write(&model_path, ARTIFACT).unwrap();

        let hash = sha256_hex(ARTIFACT.as_bytes());
        assert!(ModelLoader::verify_model(&model_path, &hash).await.unwrap());
        assert!(!ModelLoader::verify_model(&model_path, "abc").await.unwrap());
        assert!(!ModelLoader::verify_model(&temp_dir.path().join("nope"), &hash).await.unwrap());
    }
}
