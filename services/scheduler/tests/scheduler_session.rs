use chrono::NaiveDate;
use scheduler::app::{self, Scheduler};
use scheduler::store::SchedulerStore;
use scheduler::store::memory::InMemoryStore;
use std::sync::Arc;

fn date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("date")
}

async fn run_script(store: Arc<InMemoryStore>, script: &str) -> Vec<String> {
    let mut scheduler = Scheduler::new(store);
    let mut output = Vec::new();
    app::run(&mut scheduler, script.as_bytes(), &mut output, false)
        .await
        .expect("run script");
    let text = String::from_utf8(output).expect("utf8");
    text.split(app::PROMPT)
        .flat_map(|chunk| chunk.lines())
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn caregiver_and_patient_book_and_cancel() {
    let store = Arc::new(InMemoryStore::new());
    let script = "\
create_caregiver carol Str0ng!Pwd
login_caregiver carol Str0ng!Pwd
upload_availability 2024-06-01
add_doses Pfizer 5
logout
create_patient pat Str0ng!Pwd
login_patient pat Str0ng!Pwd
reserve 2024-06-01 Pfizer
show_appointments
search_caregiver_schedule 2024-06-01
cancel 1
show_appointments
search_caregiver_schedule 2024-06-01
quit
";
    let transcript = run_script(store.clone(), script).await;
    assert_eq!(
        transcript,
        vec![
            "Created user carol",
            "Logged in as: carol",
            "Availability uploaded!",
            "Doses updated!",
            "Successfully logged out",
            "Created user pat",
            "Logged in as pat",
            "Appointment ID 1, Caregiver username carol",
            "1 Pfizer 2024-06-01 carol",
            "Caregivers: ",
            "No caregivers available",
            "Vaccines: ",
            "Pfizer 4",
            "Appointment ID 1 has been successfully canceled",
            "No appointments scheduled",
            "Caregivers: ",
            "carol",
            "Vaccines: ",
            "Pfizer 5",
            "Bye!",
        ]
    );

    let vaccines = store.list_vaccines().await.expect("vaccines");
    assert_eq!(vaccines[0].doses, 5);
    assert_eq!(
        store
            .list_available_caregivers(date("2024-06-01"))
            .await
            .expect("caregivers"),
        vec!["carol".to_string()]
    );
}

#[tokio::test]
async fn weak_passwords_are_rejected_for_both_roles() {
    let store = Arc::new(InMemoryStore::new());
    let transcript = run_script(
        store.clone(),
        "create_patient pat abc123\ncreate_caregiver carol abc123\n",
    )
    .await;
    assert_eq!(transcript.len(), 2);
    assert!(transcript[0].starts_with("Create patient failed, please use a strong password"));
    assert!(transcript[1].starts_with("Create caregiver failed, please use a strong password"));
    assert!(
        !store
            .username_exists(scheduler::model::Role::Patient, "pat")
            .await
            .expect("lookup")
    );
}

#[tokio::test]
async fn caregiver_sees_patient_in_appointments() {
    let store = Arc::new(InMemoryStore::new());
    let script = "\
create_caregiver carol Str0ng!Pwd
create_caregiver bob Str0ng!Pwd
create_patient pat Str0ng!Pwd
login_caregiver carol Str0ng!Pwd
upload_availability 2024-06-01
add_doses Moderna 1
logout
login_caregiver bob Str0ng!Pwd
upload_availability 2024-06-01
logout
login_patient pat Str0ng!Pwd
reserve 2024-06-01 Moderna
reserve 2024-06-01 Moderna
reserve 2024-06-02 Moderna
reserve 2024-06-01 Novavax
logout
login_caregiver bob Str0ng!Pwd
show_appointments
cancel 1
cancel 1
show_appointments
";
    let transcript = run_script(store, script).await;
    assert_eq!(
        &transcript[11..],
        &[
            "Appointment ID 1, Caregiver username bob",
            "Not enough available doses",
            "No caregiver is available",
            "Not enough available doses",
            "Successfully logged out",
            "Logged in as: bob",
            "1 Moderna 2024-06-01 pat",
            "Appointment ID 1 has been successfully canceled",
            "Appointment ID 1 does not exist",
            "No appointments scheduled",
        ]
    );
}

#[tokio::test]
async fn session_rules_hold_across_commands() {
    let store = Arc::new(InMemoryStore::new());
    let script = "\
logout
create_patient pat Str0ng!Pwd
login_patient pat Str0ng!Pwd
login_patient pat Str0ng!Pwd
upload_availability 2024-06-01
add_doses Pfizer 3
logout extra
logout
logout
frobnicate
";
    let transcript = run_script(store, script).await;
    assert_eq!(
        transcript,
        vec![
            "Please login first",
            "Created user pat",
            "Logged in as pat",
            "User already logged in, try again",
            "Please login as a caregiver first!",
            "Please login as a caregiver first!",
            "Please try again",
            "Successfully logged out",
            "Please login first",
            "Invalid operation name!",
        ]
    );
}

#[tokio::test]
async fn banner_precedes_the_first_prompt() {
    let mut scheduler = Scheduler::new(Arc::new(InMemoryStore::new()));
    let mut output = Vec::new();
    app::run(&mut scheduler, &b"quit\n"[..], &mut output, true)
        .await
        .expect("run");
    let text = String::from_utf8(output).expect("utf8");
    let welcome = text
        .find("Welcome to the COVID-19 Vaccine Reservation Scheduling Application!")
        .expect("banner");
    let prompt = text.find("\n> \n").unwrap_or(text.len());
    assert!(welcome < prompt);
    assert!(text.contains("> reserve <date> <vaccine>"));
    assert!(text.ends_with("> Bye!\n"));
}

#[tokio::test]
async fn invalid_utf8_line_does_not_end_the_session() {
    let mut scheduler = Scheduler::new(Arc::new(InMemoryStore::new()));
    let input: &[u8] = b"create_patient pat Str0ng!Pwd\n\
login_patient p\xffat Str0ng!Pwd\n\
create_caregiver carol Str0ng!Pwd\r\n\
quit\n";
    let mut output = Vec::new();
    app::run(&mut scheduler, input, &mut output, false)
        .await
        .expect("run");
    let text = String::from_utf8(output).expect("utf8");
    assert_eq!(
        text,
        "> Created user pat\n> Login patient failed\n> Created user carol\n> Bye!\n"
    );
    assert!(!scheduler.session().is_logged_in());
}
