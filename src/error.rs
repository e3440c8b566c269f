/// Request-level failures of the meme pipeline.
///
/// Domain outcomes ("your photo gave us nothing to work with") are kept apart
/// from stage faults ("a collaborator broke") so callers can answer with a
/// client-correctable status for the former.
#[derive(thiserror::Error, Debug)]
pub enum MemeError {
    #[error("No faces/emotions detected in the image")]
    NoFaces,

    #[error("Detected {faces} face(s) but none could be classified")]
    NoUsableEmotion { faces: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Face detection failed: {0:#}")]
    Detection(anyhow::Error),

    #[error("Dialogue generation failed: {0:#}")]
    Dialogue(anyhow::Error),

    #[error("Preparing meme template failed: {0:#}")]
    Template(anyhow::Error),

    #[error("Writing meme failed: {0:#}")]
    Output(anyhow::Error),
}

impl MemeError {
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            MemeError::NoFaces | MemeError::NoUsableEmotion { .. } | MemeError::InvalidInput(_)
        )
    }

    /// HTTP-style status for the request boundary.
    pub fn status_code(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            500
        }
    }

    /// Process exit code for the command-line front end.
    pub fn exit_code(&self) -> i32 {
        if self.is_client_error() {
            2
        } else {
            1
        }
    }
}

pub type Result<T, E = MemeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_are_client_errors() {
        assert_eq!(MemeError::NoFaces.status_code(), 400);
        assert_eq!(MemeError::NoUsableEmotion { faces: 2 }.status_code(), 400);
        assert_eq!(MemeError::InvalidInput("bad png".into()).exit_code(), 2);
    }

    #[test]
    fn stage_errors_are_server_errors() {
        let e = MemeError::Dialogue(anyhow::anyhow!("connection reset"));
        assert_eq!(e.status_code(), 500);
        assert_eq!(e.exit_code(), 1);
        assert!(e.to_string().contains("connection reset"));
    }
}
