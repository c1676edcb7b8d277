use anyhow::Result;
use log::info;
use sqlx::SqlitePool;

use crate::error::ApiError;
use crate::models::{Barber, BarberInput, Product, ProductInput, Service, ServiceInput};

const SERVICE_COLUMNS: &str = "id, name, description, price, duration";
const BARBER_COLUMNS: &str = "id, name, speciality, photo, description, start_hour";
const PRODUCT_COLUMNS: &str = "id, name, description, price, image";

/// Services, barbers and products offered by the shop.
pub struct CatalogService {
    pool: SqlitePool,
}

fn validate_service(input: &ServiceInput) -> Result<()> {
    if input.name.trim().is_empty() {
        return Err(ApiError::bad_request("Service name is required").into());
    }
    if input.price < 0.0 || input.duration <= 0 {
        return Err(ApiError::bad_request("Price must be >= 0 and duration > 0").into());
    }
    Ok(())
}

fn validate_barber(input: &BarberInput) -> Result<()> {
    if input.name.trim().is_empty() {
        return Err(ApiError::bad_request("Barber name is required").into());
    }
    if let Some(hour) = input.start_hour {
        if !(0..=23).contains(&hour) {
            return Err(ApiError::bad_request("startHour must be between 0 and 23").into());
        }
    }
    Ok(())
}

fn validate_product(input: &ProductInput) -> Result<()> {
    if input.name.trim().is_empty() {
        return Err(ApiError::bad_request("Product name is required").into());
    }
    if input.price < 0.0 {
        return Err(ApiError::bad_request("Price must be >= 0").into());
    }
    Ok(())
}

impl CatalogService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn services(&self) -> Result<Vec<Service>> {
        let services = sqlx::query_as::<_, Service>(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(services)
    }

    pub async fn service(&self, id: i64) -> Result<Service> {
        sqlx::query_as::<_, Service>(&format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Service not found").into())
    }

    pub async fn create_service(&self, input: ServiceInput) -> Result<Service> {
        validate_service(&input)?;
        let service = sqlx::query_as::<_, Service>(&format!(
            "INSERT INTO services (name, description, price, duration) VALUES (?, ?, ?, ?) \
             RETURNING {SERVICE_COLUMNS}"
        ))
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(input.price)
        .bind(input.duration)
        .fetch_one(&self.pool)
        .await?;

        info!("Service created: {} ({})", service.name, service.id);
        Ok(service)
    }

    pub async fn update_service(&self, id: i64, input: ServiceInput) -> Result<Service> {
        validate_service(&input)?;
        sqlx::query_as::<_, Service>(&format!(
            "UPDATE services SET name = ?, description = ?, price = ?, duration = ? WHERE id = ? \
             RETURNING {SERVICE_COLUMNS}"
        ))
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(input.price)
        .bind(input.duration)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Service not found").into())
    }

    pub async fn delete_service(&self, id: i64) -> Result<()> {
        self.delete_from("services", id, "Service not found").await
    }

    pub async fn barbers(&self) -> Result<Vec<Barber>> {
        let barbers = sqlx::query_as::<_, Barber>(&format!(
            "SELECT {BARBER_COLUMNS} FROM barbers ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(barbers)
    }

    pub async fn barber(&self, id: i64) -> Result<Barber> {
        sqlx::query_as::<_, Barber>(&format!("SELECT {BARBER_COLUMNS} FROM barbers WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Barber not found").into())
    }

    pub async fn create_barber(&self, input: BarberInput) -> Result<Barber> {
        validate_barber(&input)?;
        let barber = sqlx::query_as::<_, Barber>(&format!(
            "INSERT INTO barbers (name, speciality, photo, description, start_hour) \
             VALUES (?, ?, ?, ?, ?) RETURNING {BARBER_COLUMNS}"
        ))
        .bind(input.name.trim())
        .bind(&input.speciality)
        .bind(&input.photo)
        .bind(&input.description)
        .bind(input.start_hour)
        .fetch_one(&self.pool)
        .await?;

        info!("Barber created: {} ({})", barber.name, barber.id);
        Ok(barber)
    }

    pub async fn update_barber(&self, id: i64, input: BarberInput) -> Result<Barber> {
        validate_barber(&input)?;
        sqlx::query_as::<_, Barber>(&format!(
            "UPDATE barbers SET name = ?, speciality = ?, photo = ?, description = ?, start_hour = ? \
             WHERE id = ? RETURNING {BARBER_COLUMNS}"
        ))
        .bind(input.name.trim())
        .bind(&input.speciality)
        .bind(&input.photo)
        .bind(&input.description)
        .bind(input.start_hour)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Barber not found").into())
    }

    pub async fn delete_barber(&self, id: i64) -> Result<()> {
        self.delete_from("barbers", id, "Barber not found").await
    }

    pub async fn products(&self) -> Result<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(products)
    }

    pub async fn product(&self, id: i64) -> Result<Product> {
        sqlx::query_as::<_, Product>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Product not found").into())
    }

    pub async fn create_product(&self, input: ProductInput) -> Result<Product> {
        validate_product(&input)?;
        let product = sqlx::query_as::<_, Product>(&format!(
            "INSERT INTO products (name, description, price, image) VALUES (?, ?, ?, ?) \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(input.price)
        .bind(&input.image)
        .fetch_one(&self.pool)
        .await?;

        info!("Product created: {} ({})", product.name, product.id);
        Ok(product)
    }

    pub async fn update_product(&self, id: i64, input: ProductInput) -> Result<Product> {
        validate_product(&input)?;
        sqlx::query_as::<_, Product>(&format!(
            "UPDATE products SET name = ?, description = ?, price = ?, image = ? WHERE id = ? \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(input.price)
        .bind(&input.image)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found").into())
    }

    pub async fn delete_product(&self, id: i64) -> Result<()> {
        self.delete_from("products", id, "Product not found").await
    }

    // `table` is always one of the literals above.
    async fn delete_from(&self, table: &str, id: i64, missing: &str) -> Result<()> {
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = ?"))
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::not_found(missing).into());
        }
        info!("Deleted {} {}", table, id);
        Ok(())
    }
}
