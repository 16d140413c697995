pub mod calculator;
pub mod repository;
pub mod supabase;

pub use calculator::AvailabilityCalculator;
pub use repository::{BookedTimeReader, InMemoryScheduleRepository, ScheduleRepository};
pub use supabase::SupabaseScheduleRepository;
