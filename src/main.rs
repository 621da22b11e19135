use examsy_sync::config::Config;
use examsy_sync::ExamsyCore;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config = Config::from_env();
    config.init_tracing();

    let core = match ExamsyCore::start(&config).await {
        Ok(core) => core,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start sync core");
            std::process::exit(1);
        }
    };

    core.mirror.wait_loaded().await;
    let state = core.session.lock().await.state().clone();
    tracing::info!(
        students = core.mirror.students().len(),
        sessions = core.mirror.sessions().len(),
        rooms = core.mirror.rooms().len(),
        state = %state,
        "Examsy sync ready"
    );

    let mut students = core.mirror.watch_students();
    let mut sessions = core.mirror.watch_sessions();
    let mut rooms = core.mirror.watch_rooms();

    loop {
        tokio::select! {
            Ok(()) = students.changed() => {
                let count = students.borrow_and_update().len();
                tracing::info!(count, "Students updated");
            }
            Ok(()) = sessions.changed() => {
                let active = sessions.borrow_and_update().values().filter(|s| s.is_active).count();
                tracing::info!(active, "Sessions updated");
            }
            Ok(()) = rooms.changed() => {
                let count = rooms.borrow_and_update().len();
                tracing::info!(count, "Rooms updated");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested");
                break;
            }
        }
    }

    core.shutdown();
    if let Err(e) = core.persist(&config).await {
        tracing::error!(error = %e, "Failed to persist store on shutdown");
    }
}
