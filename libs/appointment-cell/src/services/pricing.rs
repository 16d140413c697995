use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_models::ServiceSelection;

use crate::models::{AppointmentError, BookingQuote, QuoteItem};
use crate::services::repository::CatalogReader;

/// Turns a list of (service, area) selections into effective durations and prices.
pub struct PricingService {
    catalog: Arc<dyn CatalogReader>,
}

impl PricingService {
    pub fn new(catalog: Arc<dyn CatalogReader>) -> Self {
        Self { catalog }
    }

    /// Quote a set of selections for a clinic. Each item uses the
    /// service-area override when one is set, else the service base values.
    pub async fn quote(
        &self,
        clinic_id: Uuid,
        selections: &[ServiceSelection],
    ) -> Result<BookingQuote, AppointmentError> {
        debug!("Quoting {} selections for clinic {}", selections.len(), clinic_id);

        if selections.is_empty() {
            return Err(AppointmentError::ValidationError(
                "At least one service must be selected".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(selections.len());

        for selection in selections {
            if !seen.insert(*selection) {
                return Err(AppointmentError::ValidationError(format!(
                    "Service {} selected more than once",
                    selection.service_id
                )));
            }
            items.push(self.quote_item(clinic_id, selection).await?);
        }

        let quote = BookingQuote::from_items(items);
        if quote.total_duration_minutes <= 0 {
            return Err(AppointmentError::ValidationError(
                "Selected services have no bookable duration".to_string(),
            ));
        }

        info!(
            "Quoted {} items for clinic {}: {} minutes, {:.2}",
            quote.items.len(),
            clinic_id,
            quote.total_duration_minutes,
            quote.total_price
        );
        Ok(quote)
    }

    async fn quote_item(
        &self,
        clinic_id: Uuid,
        selection: &ServiceSelection,
    ) -> Result<QuoteItem, AppointmentError> {
        let service = self
            .catalog
            .service(selection.service_id)
            .await?
            .filter(|s| s.clinic_id == clinic_id && s.is_active)
            .ok_or_else(|| AppointmentError::NotFound(format!("Service {}", selection.service_id)))?;

        match selection.area_id {
            Some(area_id) => {
                let service_area = self
                    .catalog
                    .service_area(service.id, area_id)
                    .await?
                    .ok_or_else(|| {
                        AppointmentError::NotFound(format!("Area {} for service {}", area_id, service.id))
                    })?;

                Ok(QuoteItem {
                    service_id: service.id,
                    service_name: service.name.clone(),
                    area_id: Some(area_id),
                    area_name: Some(service_area.area_name.clone()),
                    duration_minutes: service_area.effective_duration(&service),
                    price: service_area.effective_price(&service),
                })
            }
            None => Ok(QuoteItem {
                service_id: service.id,
                service_name: service.name.clone(),
                area_id: None,
                area_name: None,
                duration_minutes: service.duration_minutes,
                price: service.price,
            }),
        }
    }
}
