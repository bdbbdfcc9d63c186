pub mod forecasting; // Health-card demand forecasting
