pub mod conflict;
pub mod lifecycle;
pub mod memory;
pub mod pricing;
pub mod repository;
pub mod side_effects;
pub mod supabase;

pub use conflict::ConflictDetectionService;
pub use lifecycle::AppointmentLifecycleManager;
pub use memory::InMemoryAppointmentStore;
pub use pricing::PricingService;
pub use repository::{AppointmentRepository, CatalogReader};
pub use side_effects::{ReminderScheduler, SideEffects, SpreadsheetMirror};
pub use supabase::SupabaseAppointmentRepository;
