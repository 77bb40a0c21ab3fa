//! # lecture-topics
//!
//! Cross-lecture topic discovery for a module.
//!
//! Detection clusters every embedded chunk of a module (HDBSCAN or seeded
//! k-means, chosen in configuration), names each surviving cluster through
//! the generation gateway, records how often the topic occurs in each
//! lecture and replaces the module's stored topics in one atomic write.
//!
//! Stored topics feed prerequisite inference: a topic that first appears
//! earlier and later co-occurs with another is treated as its
//! prerequisite.

pub mod appearances;
pub mod clustering;
pub mod dashboard;
pub mod detector;
pub mod error;
pub mod labeling;
pub mod map;
pub mod prerequisites;

pub use clustering::{build_clusterer, Clusterer, HdbscanClusterer, KMeansClusterer, NOISE};
pub use dashboard::{module_stats, overall_stats, DashboardStats, ModuleDashboard};
pub use detector::TopicDetector;
pub use error::TopicsError;
pub use labeling::{TopicLabel, TopicLabeler};
pub use map::{TopicMap, TopicNode};
pub use prerequisites::{infer_prerequisites, EdgeType, PrerequisiteEdge};
