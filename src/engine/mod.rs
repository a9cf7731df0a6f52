// Bracket engine: pure algorithms over in-memory match rows
pub mod advancement;
pub mod match_graph;
pub mod round_names;
pub mod round_robin;
pub mod seeder;
pub mod standings;

pub use advancement::AdvancementResult;
pub use standings::POINTS_PER_WIN;
