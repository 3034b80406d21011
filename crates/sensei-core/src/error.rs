use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("language model error: {0}")]
    Llm(#[from] sensei_llm::LlmError),

    #[error(transparent)]
    Exec(#[from] sensei_exec::ExecError),

    #[error("no follow-up number {ordinal}; the last answer offered {available}")]
    NoSuchNextStep { ordinal: usize, available: usize },
}
