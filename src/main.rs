use std::str::FromStr;
use std::sync::Arc;
use dotenv::dotenv;
use log::{error, info, warn};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use ubb_grades::config::{accounts_path_from_env, encryption_key_from_env};
use ubb_grades::utils::accounts::{AesCipher, JsonAccountStore};
use ubb_grades::{GradeService, PortalConfig};

// Logs in with UBB_RUT/UBB_PASSWORD and prints the course averages of every career.
#[tokio::main]
async fn main() {
    dotenv().ok();

    let level = std::env::var("UBB_LOG_LEVEL")
        .ok()
        .and_then(|level| LevelFilter::from_str(&level).ok())
        .unwrap_or(LevelFilter::Info);

    // Terminal logging at UBB_LOG_LEVEL, Info by default.
    if let Err(e) = TermLogger::init(level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto) {
        eprintln!("Could not initialize logging: {}", e);
    }

    let (identifier, secret) = match (std::env::var("UBB_RUT"), std::env::var("UBB_PASSWORD")) {
        (Ok(identifier), Ok(secret)) => (identifier, secret),
        _ => {
            error!("UBB_RUT and UBB_PASSWORD environment variables are required");
            return;
        }
    };

    let config = match PortalConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            return;
        }
    };

    let cipher = match encryption_key_from_env().and_then(|key| AesCipher::new(&key)) {
        Ok(cipher) => cipher,
        Err(e) => {
            error!("Invalid encryption key: {:#}", e);
            return;
        }
    };

    let service = GradeService::new(config, Arc::new(JsonAccountStore::new(accounts_path_from_env())), Arc::new(cipher));

    // Logs in and keeps only the portal-assigned session identifier.
    let session_id = match service.login(&identifier, &secret).await {
        Ok(response) if response.success => match response.session_id {
            Some(session_id) => session_id,
            None => {
                error!("Login succeeded without a session identifier");
                return;
            }
        },
        Ok(response) => {
            warn!("Login rejected, check your credentials: {:?}", response.debug_info);
            return;
        }
        Err(e) => {
            error!("Error logging in: {}", e);
            return;
        }
    };
    info!("Logged in, session {}", session_id);

    let dashboard = match service.get_dashboard(&session_id).await {
        Ok(dashboard) => dashboard,
        Err(e) => {
            error!("Error loading dashboard: {}", e);
            return;
        }
    };
    info!("Student: {}", dashboard.full_name);

    // Prints the projected average of every course, career by career.
    for career in &dashboard.careers {
        match service.get_parsed_courses(&session_id, career).await {
            Ok(courses) => {
                println!("{}", career.name);
                for course in courses {
                    println!("  {:<50} {:.2}", course.name, course.average);
                }
            }
            Err(e) => error!("Error retrieving courses for {}: {}", career.name, e),
        }
    }
}
