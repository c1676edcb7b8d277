use actix_web::{web, HttpRequest, HttpResponse};

use crate::auth::{require_admin, AuthService};
use crate::catalog::CatalogService;
use crate::error::ApiError;
use crate::models::{BarberInput, ProductInput, ServiceInput};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/services")
            .route("", web::get().to(list_services))
            .route("", web::post().to(create_service))
            .route("/{id}", web::get().to(get_service))
            .route("/{id}", web::put().to(update_service))
            .route("/{id}", web::delete().to(delete_service)),
    )
    .service(
        web::scope("/barbers")
            .route("", web::get().to(list_barbers))
            .route("", web::post().to(create_barber))
            .route("/{id}", web::get().to(get_barber))
            .route("/{id}", web::put().to(update_barber))
            .route("/{id}", web::delete().to(delete_barber)),
    )
    .service(
        web::scope("/products")
            .route("", web::get().to(list_products))
            .route("", web::post().to(create_product))
            .route("/{id}", web::get().to(get_product))
            .route("/{id}", web::put().to(update_product))
            .route("/{id}", web::delete().to(delete_product)),
    );
}

async fn list_services(catalog: web::Data<CatalogService>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(catalog.services().await?))
}

async fn get_service(
    catalog: web::Data<CatalogService>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(catalog.service(path.into_inner()).await?))
}

async fn create_service(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    catalog: web::Data<CatalogService>,
    body: web::Json<ServiceInput>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &auth_service).await?;
    Ok(HttpResponse::Created().json(catalog.create_service(body.into_inner()).await?))
}

async fn update_service(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    catalog: web::Data<CatalogService>,
    path: web::Path<i64>,
    body: web::Json<ServiceInput>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &auth_service).await?;
    let service = catalog
        .update_service(path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(service))
}

async fn delete_service(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    catalog: web::Data<CatalogService>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &auth_service).await?;
    catalog.delete_service(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn list_barbers(catalog: web::Data<CatalogService>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(catalog.barbers().await?))
}

async fn get_barber(
    catalog: web::Data<CatalogService>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(catalog.barber(path.into_inner()).await?))
}

async fn create_barber(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    catalog: web::Data<CatalogService>,
    body: web::Json<BarberInput>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &auth_service).await?;
    Ok(HttpResponse::Created().json(catalog.create_barber(body.into_inner()).await?))
}

async fn update_barber(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    catalog: web::Data<CatalogService>,
    path: web::Path<i64>,
    body: web::Json<BarberInput>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &auth_service).await?;
    let barber = catalog
        .update_barber(path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(barber))
}

async fn delete_barber(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    catalog: web::Data<CatalogService>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &auth_service).await?;
    catalog.delete_barber(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn list_products(catalog: web::Data<CatalogService>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(catalog.products().await?))
}

async fn get_product(
    catalog: web::Data<CatalogService>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(catalog.product(path.into_inner()).await?))
}

async fn create_product(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    catalog: web::Data<CatalogService>,
    body: web::Json<ProductInput>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &auth_service).await?;
    Ok(HttpResponse::Created().json(catalog.create_product(body.into_inner()).await?))
}

async fn update_product(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    catalog: web::Data<CatalogService>,
    path: web::Path<i64>,
    body: web::Json<ProductInput>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &auth_service).await?;
    let product = catalog
        .update_product(path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(product))
}

async fn delete_product(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    catalog: web::Data<CatalogService>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &auth_service).await?;
    catalog.delete_product(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
