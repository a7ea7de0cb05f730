//! 外部协作服务的具体实现

pub mod llm_client;
pub mod ocr_client;
pub mod pdf_renderer;

pub use llm_client::LlmClient;
pub use ocr_client::OcrClient;
pub use pdf_renderer::PdftoppmRenderer;
