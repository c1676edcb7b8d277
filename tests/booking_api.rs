mod common;

use actix_web::{http::StatusCode, test, App, ResponseError};
use barbershop_backend::error::ApiError;
use barbershop_backend::events::ChangeKind;
use barbershop_backend::models::{AppointmentStatus, BlockedSlotInput, BookingRequest};
use barbershop_backend::routes;
use chrono::{NaiveDate, NaiveTime};
use serde_json::{json, Value};

// A Tuesday well in the future, so no slot is ever in the past.
const TUESDAY: &str = "2030-01-08";
const MONDAY: &str = "2030-01-07";

fn tuesday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 8).unwrap()
}

#[actix_web::test]
async fn slot_grid_for_a_free_day_has_44_slots() {
    let (services, _) = common::setup().await;
    let aladin = common::barber(&services, "Aladin").await;
    let coupe = common::service(&services, "Coupe").await;
    let app = test::init_service(
        App::new()
            .configure(|cfg| services.register(cfg))
            .configure(routes::config),
    )
    .await;

    let req = test::TestRequest::get()
        .uri(&format!(
            "/api/appointments/slots?barberId={}&date={}&serviceIds={}",
            aladin.id, TUESDAY, coupe.id
        ))
        .to_request();
    let grid: Vec<Value> = test::call_and_read_body_json(&app, req).await;

    assert_eq!(grid.len(), 44);
    assert_eq!(grid[0]["time"], "10:00");
    assert_eq!(grid[43]["time"], "20:45");
    assert!(grid.iter().all(|slot| slot["isAvailable"] == true && slot["isPast"] == false));
}

#[actix_web::test]
async fn later_starting_barber_and_monday_windows() {
    let (services, _) = common::setup().await;
    let hamouda = common::barber(&services, "Hamouda").await;
    let app = test::init_service(
        App::new()
            .configure(|cfg| services.register(cfg))
            .configure(routes::config),
    )
    .await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/appointments/slots?barberId={}&date={}", hamouda.id, TUESDAY))
        .to_request();
    let grid: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(grid[0]["time"], "12:00");
    assert_eq!(grid.len(), 36);

    let req = test::TestRequest::get()
        .uri(&format!("/api/appointments/available?barberId={}&date={}", hamouda.id, MONDAY))
        .to_request();
    let free: Vec<String> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(free.first().map(String::as_str), Some("12:00"));
    assert_eq!(free.last().map(String::as_str), Some("17:45"));
}

#[actix_web::test]
async fn guest_booking_takes_the_slot_and_rejects_overlaps() {
    let (services, _) = common::setup().await;
    let aladin = common::barber(&services, "Aladin").await;
    let coupe = common::service(&services, "Coupe").await;
    let app = test::init_service(
        App::new()
            .configure(|cfg| services.register(cfg))
            .configure(routes::config),
    )
    .await;

    let booking = json!({
        "barberId": aladin.id,
        "serviceIds": [coupe.id],
        "date": TUESDAY,
        "startTime": "10:00",
        "userName": "Sami",
        "userPhone": "0611111111"
    });

    let req = test::TestRequest::post()
        .uri("/api/appointments/book")
        .set_json(&booking)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "BOOKED");
    assert_eq!(body["startTime"], "10:00");
    assert_eq!(body["endTime"], "10:30");
    assert_eq!(body["user"]["name"], "Sami");
    assert_eq!(body["services"][0]["name"], "Coupe");

    let overlapping = json!({
        "barberId": aladin.id,
        "serviceIds": [coupe.id],
        "date": TUESDAY,
        "startTime": "10:15",
        "userName": "Karim",
        "userPhone": "0622222222"
    });
    let req = test::TestRequest::post()
        .uri("/api/appointments/book")
        .set_json(&overlapping)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Slot not available (Conflict with appointment)");

    let req = test::TestRequest::get()
        .uri(&format!("/api/appointments/available?barberId={}&date={}", aladin.id, TUESDAY))
        .to_request();
    let free: Vec<String> = test::call_and_read_body_json(&app, req).await;
    assert!(!free.contains(&"10:00".to_string()));
    assert!(!free.contains(&"10:15".to_string()));
    assert!(free.contains(&"10:30".to_string()));
}

#[actix_web::test]
async fn booking_length_follows_the_selected_services() {
    let (services, _) = common::setup().await;
    let aladin = common::barber(&services, "Aladin").await;
    let coupe = common::service(&services, "Coupe").await;
    let brushing = common::service(&services, "Brushing").await;
    let app = test::init_service(
        App::new()
            .configure(|cfg| services.register(cfg))
            .configure(routes::config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/appointments/book")
        .set_json(json!({
            "barberId": aladin.id,
            "serviceIds": [coupe.id, brushing.id],
            "date": TUESDAY,
            "startTime": "14:00",
            "userName": "Nour",
            "userPhone": "0633333333"
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["endTime"], "14:45");
    assert_eq!(body["totalPrice"], 17.0);
}

#[actix_web::test]
async fn guest_booking_needs_name_and_phone() {
    let (services, _) = common::setup().await;
    let aladin = common::barber(&services, "Aladin").await;
    let coupe = common::service(&services, "Coupe").await;
    let app = test::init_service(
        App::new()
            .configure(|cfg| services.register(cfg))
            .configure(routes::config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/appointments/book")
        .set_json(json!({
            "barberId": aladin.id,
            "serviceIds": [coupe.id],
            "date": TUESDAY,
            "startTime": "11:00",
            "userName": "Nameless"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/appointments/book")
        .set_json(json!({
            "barberId": aladin.id,
            "serviceIds": [],
            "date": TUESDAY,
            "startTime": "11:00",
            "userName": "Sami",
            "userPhone": "0611111111"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn blocked_day_empties_availability_and_refuses_bookings() {
    let (services, _) = common::setup().await;
    let aladin = common::barber(&services, "Aladin").await;
    let coupe = common::service(&services, "Coupe").await;

    services
        .blocked
        .create(BlockedSlotInput {
            date: tuesday(),
            start_time: None,
            end_time: None,
            barber_id: None,
            reason: Some("Holiday".to_string()),
        })
        .await
        .unwrap();

    let app = test::init_service(
        App::new()
            .configure(|cfg| services.register(cfg))
            .configure(routes::config),
    )
    .await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/appointments/available?barberId={}&date={}", aladin.id, TUESDAY))
        .to_request();
    let free: Vec<String> = test::call_and_read_body_json(&app, req).await;
    assert!(free.is_empty());

    let req = test::TestRequest::post()
        .uri("/api/appointments/book")
        .set_json(json!({
            "barberId": aladin.id,
            "serviceIds": [coupe.id],
            "date": TUESDAY,
            "startTime": "15:00",
            "userName": "Sami",
            "userPhone": "0611111111"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Date is blocked by administrator");
}

#[actix_web::test]
async fn partial_block_only_covers_its_window() {
    let (services, _) = common::setup().await;
    let aladin = common::barber(&services, "Aladin").await;

    services
        .blocked
        .create(BlockedSlotInput {
            date: tuesday(),
            start_time: Some("16:00".to_string()),
            end_time: None,
            barber_id: Some(aladin.id),
            reason: None,
        })
        .await
        .unwrap();

    let free = services.appointments.available(aladin.id, tuesday()).await.unwrap();
    let labels: Vec<String> = free.iter().map(|t| t.format("%H:%M").to_string()).collect();
    assert!(labels.contains(&"15:45".to_string()));
    assert!(!labels.contains(&"16:00".to_string()));
    assert!(!labels.contains(&"16:15".to_string()));
    assert!(labels.contains(&"16:30".to_string()));

    let hamouda = common::barber(&services, "Hamouda").await;
    let others = services.appointments.available(hamouda.id, tuesday()).await.unwrap();
    assert_eq!(others.len(), 36);
}

#[actix_web::test]
async fn client_sees_and_cancels_only_their_own_appointments() {
    let (services, _) = common::setup().await;
    let aladin = common::barber(&services, "Aladin").await;
    let coupe = common::service(&services, "Coupe").await;
    let (_, token) = common::client(&services, "yasmine", "0644444444").await;
    let (_, other_token) = common::client(&services, "omar", "0655555555").await;
    let app = test::init_service(
        App::new()
            .configure(|cfg| services.register(cfg))
            .configure(routes::config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/appointments/book")
        .insert_header(common::bearer(&token))
        .set_json(json!({
            "barberId": aladin.id,
            "serviceIds": [coupe.id],
            "date": TUESDAY,
            "startTime": "12:00"
        }))
        .to_request();
    let booked: Value = test::call_and_read_body_json(&app, req).await;
    let id = booked["id"].as_i64().unwrap();
    assert_eq!(booked["user"]["phone"], "0644444444");

    let req = test::TestRequest::get()
        .uri("/api/appointments/my-appointments")
        .insert_header(common::bearer(&token))
        .to_request();
    let mine: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(mine.len(), 1);

    let req = test::TestRequest::put()
        .uri(&format!("/api/appointments/{}/cancel", id))
        .insert_header(common::bearer(&other_token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::put()
        .uri(&format!("/api/appointments/{}/cancel", id))
        .insert_header(common::bearer(&token))
        .to_request();
    let cancelled: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(cancelled["status"], "CANCELLED");

    let req = test::TestRequest::get()
        .uri("/api/appointments/by-contact?email=YASMINE@example.com")
        .to_request();
    let found: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(found.len(), 1);

    let req = test::TestRequest::get()
        .uri("/api/appointments/by-contact")
        .to_request();
    let none: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert!(none.is_empty());
}

#[actix_web::test]
async fn modify_moves_the_appointment_or_leaves_it_alone() {
    let (services, _) = common::setup().await;
    let aladin = common::barber(&services, "Aladin").await;
    let coupe = common::service(&services, "Coupe").await;
    let app = test::init_service(
        App::new()
            .configure(|cfg| services.register(cfg))
            .configure(routes::config),
    )
    .await;

    let mut ids = Vec::new();
    for (start, phone) in [("10:00", "0611111111"), ("11:00", "0622222222")] {
        let req = test::TestRequest::post()
            .uri("/api/appointments/book")
            .set_json(json!({
                "barberId": aladin.id,
                "serviceIds": [coupe.id],
                "date": TUESDAY,
                "startTime": start,
                "userName": "Guest",
                "userPhone": phone
            }))
            .to_request();
        let booked: Value = test::call_and_read_body_json(&app, req).await;
        ids.push(booked["id"].as_i64().unwrap());
    }

    // Onto the other booking: refused, and the first one stays booked.
    let req = test::TestRequest::put()
        .uri(&format!("/api/appointments/{}/modify", ids[0]))
        .set_json(json!({ "date": TUESDAY, "startTime": "11:15" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let untouched = services.appointments.view(ids[0]).await.unwrap();
    assert_eq!(untouched.status, AppointmentStatus::Booked);

    // Its own slot is released first, so a small shift works.
    let req = test::TestRequest::put()
        .uri(&format!("/api/appointments/{}/modify", ids[0]))
        .set_json(json!({ "date": TUESDAY, "startTime": "10:15" }))
        .to_request();
    let moved: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(moved["status"], "MODIFIED");
    assert_eq!(moved["startTime"], "10:15");
    assert_eq!(moved["services"][0]["name"], "Coupe");

    let old = services.appointments.view(ids[0]).await.unwrap();
    assert_eq!(old.status, AppointmentStatus::Cancelled);
}

#[actix_web::test]
async fn rescheduling_grid_offers_the_appointments_own_time() {
    let (services, _) = common::setup().await;
    let aladin = common::barber(&services, "Aladin").await;
    let coupe = common::service(&services, "Coupe").await;
    let app = test::init_service(
        App::new()
            .configure(|cfg| services.register(cfg))
            .configure(routes::config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/appointments/book")
        .set_json(json!({
            "barberId": aladin.id,
            "serviceIds": [coupe.id],
            "date": TUESDAY,
            "startTime": "10:00",
            "userName": "Sami",
            "userPhone": "0611111111"
        }))
        .to_request();
    let booked: Value = test::call_and_read_body_json(&app, req).await;
    let id = booked["id"].as_i64().unwrap();

    let grid_uri = format!(
        "/api/appointments/slots?barberId={}&date={}&serviceIds={}",
        aladin.id, TUESDAY, coupe.id
    );
    let slot_at = |grid: &[Value], time: &str| {
        grid.iter()
            .find(|slot| slot["time"] == time)
            .map(|slot| slot["isAvailable"].clone())
            .unwrap()
    };

    let req = test::TestRequest::get().uri(&grid_uri).to_request();
    let grid: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(slot_at(&grid, "10:15"), false);

    let req = test::TestRequest::get()
        .uri(&format!("{}&excludeAppointmentId={}", grid_uri, id))
        .to_request();
    let grid: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(slot_at(&grid, "10:00"), true);
    assert_eq!(slot_at(&grid, "10:15"), true);

    // The grid and the move agree.
    let req = test::TestRequest::put()
        .uri(&format!("/api/appointments/{}/modify", id))
        .set_json(json!({ "date": TUESDAY, "startTime": "10:15" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn racing_bookings_for_one_slot_end_in_a_conflict() {
    let (services, _, path) = common::setup_file("race").await;
    let aladin = common::barber(&services, "Aladin").await;
    let coupe = common::service(&services, "Coupe").await;

    let request = |hour: u32, name: &str, phone: &str| BookingRequest {
        barber_id: aladin.id,
        service_ids: vec![coupe.id],
        date: tuesday(),
        start_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
        user_name: Some(name.to_string()),
        user_first_name: None,
        user_phone: Some(phone.to_string()),
        user_email: None,
        use_reward: false,
    };

    for hour in 10..15 {
        let (first, second) = tokio::join!(
            services.appointments.book(request(hour, "Sami", "0611111111"), None),
            services.appointments.book(request(hour, "Karim", "0622222222"), None),
        );
        let mut statuses: Vec<u16> = [first, second]
            .into_iter()
            .map(|outcome| match outcome {
                Ok(_) => 200,
                Err(err) => ApiError::from(err).status_code().as_u16(),
            })
            .collect();
        statuses.sort_unstable();
        assert_eq!(statuses, vec![200, 409], "round at {}:00", hour);
    }

    let booked = services.appointments.list_all().await.unwrap();
    assert_eq!(booked.len(), 5);
    let _ = std::fs::remove_file(path);
}

#[actix_web::test]
async fn bookings_are_broadcast_to_listeners() {
    let (services, _) = common::setup().await;
    let aladin = common::barber(&services, "Aladin").await;
    let coupe = common::service(&services, "Coupe").await;
    let mut rx = services.events.subscribe();
    let app = test::init_service(
        App::new()
            .configure(|cfg| services.register(cfg))
            .configure(routes::config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/appointments/book")
        .set_json(json!({
            "barberId": aladin.id,
            "serviceIds": [coupe.id],
            "date": TUESDAY,
            "startTime": "18:00",
            "userName": "Sami",
            "userPhone": "0611111111"
        }))
        .to_request();
    let booked: Value = test::call_and_read_body_json(&app, req).await;

    let event = rx.recv().await.unwrap();
    assert_eq!(event.kind, ChangeKind::Created);
    assert_eq!(event.appointment.id, booked["id"].as_i64().unwrap());
}
