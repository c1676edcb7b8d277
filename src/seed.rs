use anyhow::Result;
use bcrypt::hash;
use log::{info, warn};
use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::models::Role;

/// (name, description, price, duration in minutes)
const SERVICES: &[(&str, &str, f64, i64)] = &[
    ("Coupe", "Coupe aux ciseaux ou tondeuse", 10.0, 30),
    ("Barbe", "Taille de barbe", 7.0, 30),
    ("Coupe (cheveux courts)", "Coupe cheveux courts", 8.0, 30),
    ("Barbe (courte)", "Taille barbe courte", 5.0, 30),
    ("Coupe + Barbe avec machine (Zéro)", "Pack complet tondeuse", 10.0, 45),
    ("Coupe + Barbe Dégradé", "Pack dégradé précis", 13.0, 45),
    ("Coupe + Barbe Dégradé + Fixation", "Pack complet avec finition", 15.0, 45),
    ("Coupe + Barbe + Brushing", "Style complet", 20.0, 45),
    ("Coupe + Barbe + Masque Noir", "Soin complet", 20.0, 45),
    ("Patchs pour les yeux", "Soin contour des yeux", 5.0, 15),
    ("Coupe d'enfant (jusqu'à 5 ans)", "Coupe junior", 7.0, 30),
    ("Brushing", "Mise en forme", 7.0, 15),
    ("Masque Noir", "Soin purifiant", 8.0, 15),
    ("Épilation à la cire", "Nettoyage précis", 3.0, 15),
    ("Soin du visage (Vapozone, Scrub, Gommage, Masque Noir)", "Soin relaxant", 25.0, 45),
    ("Protéine", "Traitement capillaire", 80.0, 90),
];

/// (name, speciality, photo, description, start hour override)
const BARBERS: &[(&str, &str, &str, &str, Option<i64>)] = &[
    ("Aladin", "Barbier", "ala.jpeg", "Spécialiste en coupes modernes et dégradés de précision.", None),
    ("Hamouda", "Barbier", "hamouda.jpeg", "Expert en taille de barbe traditionnelle et soins du visage.", Some(12)),
    ("Ahmed", "Barbier", "ahmed.jpeg", "Maîtrise des coupes classiques et des styles vintage.", Some(11)),
];

/// (name, description, price, image)
const PRODUCTS: &[(&str, &str, f64, &str)] = &[
    ("LORENTI 07 Hair Wax Spider Effect 150ml", "Cire à finition mate, aspect naturel et non gras.", 15.0, "cirespider.jpg"),
    ("LORENTI HAIR WAX 06 PRO TOUCH 150ml", "Cire professionnelle, tenue longue durée.", 15.0, "p6.jpg"),
    ("Elegance Hair Styling Powder", "Poudre volumisante pour tous les types de cheveux.", 20.0, "p2.jpg"),
    ("Elegance Paste Matte Finishing 140g", "Pâte à finition mate.", 15.0, "p4.jpg"),
    ("Elegance Gel Hair Wax", "Gel-cire, brillance intense et fixation extra forte.", 15.0, "p3.webp"),
    ("Elegance Hair Cream Wax", "Fixation souple.", 15.0, "1st.jpeg"),
    ("Huile de conditionnement pour cheveux et barbes E Elegance", "Hydratation pour cheveux et barbe.", 20.0, "5th.jpeg"),
];

/// Makes sure the admin account, the service menu, the barbers and the shop
/// products exist. Safe to run on every start.
pub async fn run(pool: &SqlitePool, config: &AppConfig) -> Result<()> {
    seed_admin(pool, config).await?;
    seed_services(pool).await?;
    seed_barbers(pool).await?;
    seed_products(pool).await?;
    Ok(())
}

async fn seed_admin(pool: &SqlitePool, config: &AppConfig) -> Result<()> {
    if config.admin_password == "admin" {
        warn!("ADMIN_PASSWORD not set. The admin account uses the default password.");
    }

    let password = hash(config.admin_password.as_bytes(), config.bcrypt_cost)?;
    sqlx::query(
        r#"INSERT INTO users (name, username, password, role)
           VALUES ('Super Admin', ?, ?, ?)
           ON CONFLICT(username) DO UPDATE SET
             password = excluded.password,
             role = excluded.role"#,
    )
    .bind(&config.admin_username)
    .bind(password)
    .bind(Role::Admin)
    .execute(pool)
    .await?;

    info!("Admin account ready: {}", config.admin_username);
    Ok(())
}

async fn seed_services(pool: &SqlitePool) -> Result<()> {
    for (name, description, price, duration) in SERVICES {
        sqlx::query(
            r#"INSERT INTO services (name, description, price, duration) VALUES (?, ?, ?, ?)
               ON CONFLICT(name) DO UPDATE SET
                 description = excluded.description,
                 price = excluded.price,
                 duration = excluded.duration"#,
        )
        .bind(name)
        .bind(description)
        .bind(price)
        .bind(duration)
        .execute(pool)
        .await?;
    }
    info!("{} default services ensured", SERVICES.len());
    Ok(())
}

async fn seed_barbers(pool: &SqlitePool) -> Result<()> {
    let (count,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM barbers")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Ok(());
    }

    for (name, speciality, photo, description, start_hour) in BARBERS {
        sqlx::query(
            "INSERT INTO barbers (name, speciality, photo, description, start_hour) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(speciality)
        .bind(photo)
        .bind(description)
        .bind(start_hour)
        .execute(pool)
        .await?;
    }
    info!("Seeded {} barbers", BARBERS.len());
    Ok(())
}

async fn seed_products(pool: &SqlitePool) -> Result<()> {
    let (count,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM products")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Ok(());
    }

    for (name, description, price, image) in PRODUCTS {
        sqlx::query("INSERT INTO products (name, description, price, image) VALUES (?, ?, ?, ?)")
            .bind(name)
            .bind(description)
            .bind(price)
            .bind(image)
            .execute(pool)
            .await?;
    }
    info!("Seeded {} products", PRODUCTS.len());
    Ok(())
}
