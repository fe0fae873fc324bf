pub mod admittance;
pub mod balanced;
pub mod dc;
pub mod display;
pub mod equations;
pub mod error;
pub mod feeders;
pub mod homopolar;
pub mod network;
pub mod reduction;
pub mod solver;
pub mod thevenin;
pub mod unbalanced;
