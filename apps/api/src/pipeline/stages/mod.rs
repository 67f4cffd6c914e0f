pub mod document_generation;
pub mod export;
pub mod job_analysis;
pub mod profile_compilation;
pub mod quality_validation;

pub use document_generation::DocumentGenerationStage;
pub use export::ExportStage;
pub use job_analysis::JobAnalysisStage;
pub use profile_compilation::ProfileCompilationStage;
pub use quality_validation::QualityValidationStage;
