//! Command dispatcher and interactive loop.
//!
//! # Purpose
//! Owns the session and the store handle, routes each parsed line to the
//! matching handler, and renders every outcome (success or failure) as output
//! lines. Nothing here ends the process except `quit` or the end of input.
//!
//! # Notes
//! Handlers check the session before validating arguments, so a logged-out
//! user is told to log in rather than about argument shape.
use crate::command::{
    CommandError, CommandLine, Operation, parse_appointment_id, parse_date, parse_dose_count,
};
use crate::error::SchedulerError;
use crate::model::{Reservation, Role};
use crate::session::Session;
use crate::store::SchedulerStore;
use crate::workflow;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

pub const PROMPT: &str = "> ";

const STRONG_PASSWORD_HINT: &str = "please use a strong password (8+ char, at least one upper and one lower, at least one letter and one number, and at least one special character, from \"!\", \"@\", \"#\", \"?\")";

/// Output produced by one command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    pub lines: Vec<String>,
    pub quit: bool,
}

impl Reply {
    fn line(text: impl Into<String>) -> Self {
        Self {
            lines: vec![text.into()],
            quit: false,
        }
    }

    fn lines(lines: Vec<String>) -> Self {
        Self { lines, quit: false }
    }
}

pub struct Scheduler {
    store: Arc<dyn SchedulerStore>,
    session: Session,
}

impl Scheduler {
    pub fn new(store: Arc<dyn SchedulerStore>) -> Self {
        Self {
            store,
            session: Session::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Parse and execute one input line.
    pub async fn handle_line(&mut self, line: &str) -> Reply {
        let command = match CommandLine::parse(line) {
            Ok(command) => command,
            Err(CommandError::Empty) => return Reply::line("Please try again!"),
            Err(err) => {
                tracing::debug!(error = %err, "unrecognized command");
                return Reply::line("Invalid operation name!");
            }
        };
        metrics::counter!("scheduler_commands_total", "command" => command.operation.name())
            .increment(1);

        let operation = command.operation;
        match operation {
            Operation::CreatePatient => self.create_account(Role::Patient, &command).await,
            Operation::CreateCaregiver => self.create_account(Role::Caregiver, &command).await,
            Operation::LoginPatient => self.login(Role::Patient, &command).await,
            Operation::LoginCaregiver => self.login(Role::Caregiver, &command).await,
            Operation::SearchCaregiverSchedule => self.search_caregiver_schedule(&command).await,
            Operation::Reserve => self.reserve(&command).await,
            Operation::UploadAvailability => self.upload_availability(&command).await,
            Operation::Cancel => self.cancel(&command).await,
            Operation::AddDoses => self.add_doses(&command).await,
            Operation::ShowAppointments => self.show_appointments(&command).await,
            Operation::Logout => self.logout(&command),
            Operation::Quit => Reply {
                lines: vec!["Bye!".to_string()],
                quit: true,
            },
        }
    }

    async fn create_account(&mut self, role: Role, command: &CommandLine) -> Reply {
        let (failed, taken) = match role {
            Role::Patient => ("Create patient failed", "Username taken, try again"),
            Role::Caregiver => ("Failed to create user.", "Username taken, try again!"),
        };
        let [username, password] = match command.expect_args::<2>() {
            Ok(args) => args,
            Err(_) => return Reply::line(failed),
        };
        match workflow::create_account(self.store.as_ref(), role, username, password).await {
            Ok(_) => Reply::line(format!("Created user {username}")),
            Err(SchedulerError::WeakPassword(_)) => {
                let prefix = match role {
                    Role::Patient => "Create patient failed",
                    Role::Caregiver => "Create caregiver failed",
                };
                Reply::line(format!("{prefix}, {STRONG_PASSWORD_HINT}"))
            }
            Err(SchedulerError::UsernameTaken) => Reply::line(taken),
            Err(err) => {
                record_failure(command.operation, &err);
                Reply::line(failed)
            }
        }
    }

    async fn login(&mut self, role: Role, command: &CommandLine) -> Reply {
        let (already, failed) = match role {
            Role::Patient => ("User already logged in, try again", "Login patient failed"),
            Role::Caregiver => ("User already logged in.", "Login failed."),
        };
        if self.session.ensure_logged_out().is_err() {
            return Reply::line(already);
        }
        let [username, password] = match command.expect_args::<2>() {
            Ok(args) => args,
            Err(_) => return Reply::line(failed),
        };
        let principal =
            match workflow::authenticate(self.store.as_ref(), role, username, password).await {
                Ok(principal) => principal,
                Err(err) => {
                    record_failure(command.operation, &err);
                    return Reply::line(failed);
                }
            };
        if self.session.login(principal).is_err() {
            return Reply::line(already);
        }
        match role {
            Role::Patient => Reply::line(format!("Logged in as {username}")),
            Role::Caregiver => Reply::line(format!("Logged in as: {username}")),
        }
    }

    async fn search_caregiver_schedule(&mut self, command: &CommandLine) -> Reply {
        if self.session.require_any().is_err() {
            return Reply::line("Please login first");
        }
        let date = match command
            .expect_args::<1>()
            .and_then(|[date]| parse_date(date))
        {
            Ok(date) => date,
            Err(_) => return Reply::line("Please try again"),
        };

        let mut lines = vec!["Caregivers: ".to_string()];
        match self.store.list_available_caregivers(date).await {
            Ok(caregivers) if caregivers.is_empty() => {
                lines.push("No caregivers available".to_string())
            }
            Ok(caregivers) => lines.extend(caregivers),
            Err(err) => {
                record_failure(command.operation, &SchedulerError::from(err));
                lines.push("Please try again".to_string());
            }
        }

        lines.push("Vaccines: ".to_string());
        match self.store.list_vaccines().await {
            Ok(vaccines) if vaccines.is_empty() => {
                lines.push("No vaccines available".to_string())
            }
            Ok(vaccines) => lines.extend(
                vaccines
                    .into_iter()
                    .map(|vaccine| format!("{} {}", vaccine.name, vaccine.doses)),
            ),
            Err(err) => {
                record_failure(command.operation, &SchedulerError::from(err));
                lines.push("Please try again".to_string());
            }
        }
        Reply::lines(lines)
    }

    async fn reserve(&mut self, command: &CommandLine) -> Reply {
        let patient = match self.session.require(Role::Patient) {
            Ok(patient) => patient.clone(),
            Err(SchedulerError::WrongRole { .. }) => {
                return Reply::line("Please login as a patient");
            }
            Err(_) => return Reply::line("Please login first"),
        };
        let (date, vaccine) = match command
            .expect_args::<2>()
            .and_then(|[date, vaccine]| Ok((parse_date(date)?, vaccine)))
        {
            Ok(parsed) => parsed,
            Err(_) => return Reply::line("Please try again"),
        };

        match workflow::reserve(self.store.as_ref(), &patient, date, vaccine).await {
            Ok(reservation) => Reply::line(format!(
                "Appointment ID {}, Caregiver username {}",
                reservation.appointment_id, reservation.caregiver
            )),
            Err(SchedulerError::NoCaregiverAvailable) => Reply::line("No caregiver is available"),
            Err(SchedulerError::NotEnoughDoses) => Reply::line("Not enough available doses"),
            Err(err) => {
                record_failure(command.operation, &err);
                Reply::line("Please try again")
            }
        }
    }

    async fn upload_availability(&mut self, command: &CommandLine) -> Reply {
        let caregiver = match self.session.require(Role::Caregiver) {
            Ok(caregiver) => caregiver.username.clone(),
            Err(_) => return Reply::line("Please login as a caregiver first!"),
        };
        let [date] = match command.expect_args::<1>() {
            Ok(args) => args,
            Err(_) => return Reply::line("Please try again!"),
        };
        let date = match parse_date(date) {
            Ok(date) => date,
            Err(_) => return Reply::line("Please enter a valid date!"),
        };
        match self.store.add_availability(&caregiver, date).await {
            Ok(()) => {
                tracing::info!(%caregiver, %date, "availability uploaded");
                Reply::line("Availability uploaded!")
            }
            Err(err) => {
                record_failure(command.operation, &SchedulerError::from(err));
                Reply::line("Error occurred when uploading availability")
            }
        }
    }

    async fn cancel(&mut self, command: &CommandLine) -> Reply {
        if self.session.require_any().is_err() {
            return Reply::line("Please login first");
        }
        let appointment_id = match command
            .expect_args::<1>()
            .and_then(|[id]| parse_appointment_id(id))
        {
            Ok(id) => id,
            Err(_) => return Reply::line("Please try again"),
        };
        match workflow::cancel(self.store.as_ref(), appointment_id).await {
            Ok(_) => Reply::line(format!(
                "Appointment ID {appointment_id} has been successfully canceled"
            )),
            Err(SchedulerError::AppointmentNotFound(id)) => {
                Reply::line(format!("Appointment ID {id} does not exist"))
            }
            Err(err) => {
                record_failure(command.operation, &err);
                Reply::line("Please try again")
            }
        }
    }

    async fn add_doses(&mut self, command: &CommandLine) -> Reply {
        if self.session.require(Role::Caregiver).is_err() {
            return Reply::line("Please login as a caregiver first!");
        }
        let (vaccine, doses) = match command
            .expect_args::<2>()
            .and_then(|[vaccine, doses]| Ok((vaccine, parse_dose_count(doses)?)))
        {
            Ok(parsed) => parsed,
            Err(_) => return Reply::line("Please try again!"),
        };
        match self.store.add_doses(vaccine, doses).await {
            Ok(stock) => {
                tracing::info!(vaccine = %stock.name, doses = stock.doses, "doses updated");
                Reply::line("Doses updated!")
            }
            Err(err) => {
                record_failure(command.operation, &SchedulerError::from(err));
                Reply::line("Error occurred when adding doses")
            }
        }
    }

    async fn show_appointments(&mut self, command: &CommandLine) -> Reply {
        let principal = match self.session.require_any() {
            Ok(principal) => principal.clone(),
            Err(_) => return Reply::line("Please login first"),
        };
        if command.expect_args::<0>().is_err() {
            return Reply::line("Please try again");
        }
        let listed = match principal.role {
            Role::Patient => self.store.list_patient_reservations(&principal.username).await,
            Role::Caregiver => {
                self.store
                    .list_caregiver_reservations(&principal.username)
                    .await
            }
        };
        match listed {
            Ok(reservations) if reservations.is_empty() => {
                Reply::line("No appointments scheduled")
            }
            Ok(reservations) => Reply::lines(
                reservations
                    .iter()
                    .map(|reservation| appointment_row(principal.role, reservation))
                    .collect(),
            ),
            Err(err) => {
                record_failure(command.operation, &SchedulerError::from(err));
                Reply::line("Please try again")
            }
        }
    }

    fn logout(&mut self, command: &CommandLine) -> Reply {
        if command.expect_args::<0>().is_err() {
            return Reply::line("Please try again");
        }
        match self.session.logout() {
            Ok(_) => Reply::line("Successfully logged out"),
            Err(_) => Reply::line("Please login first"),
        }
    }
}

/// `<id> <vaccine> <date> <counterpart>`; the counterpart is the caregiver for
/// a patient and the patient for a caregiver.
fn appointment_row(viewer: Role, reservation: &Reservation) -> String {
    let counterpart = match viewer {
        Role::Patient => &reservation.caregiver,
        Role::Caregiver => &reservation.patient,
    };
    format!(
        "{} {} {} {}",
        reservation.appointment_id, reservation.vaccine, reservation.date, counterpart
    )
}

fn record_failure(operation: Operation, err: &SchedulerError) {
    match err {
        SchedulerError::Store(_) | SchedulerError::Credential(_) => {
            metrics::counter!("scheduler_store_errors_total", "command" => operation.name())
                .increment(1);
            tracing::warn!(command = %operation, kind = err.kind(), error = %err, "command failed");
        }
        _ => tracing::debug!(command = %operation, kind = err.kind(), error = %err, "command rejected"),
    }
}

pub fn banner() -> Vec<String> {
    let mut lines = vec![
        String::new(),
        "Welcome to the COVID-19 Vaccine Reservation Scheduling Application!".to_string(),
        "*** Please enter one of the following commands ***".to_string(),
    ];
    lines.extend(
        Operation::ALL
            .iter()
            .map(|operation| format!("> {}", operation.usage())),
    );
    lines.push(String::new());
    lines
}

/// Drive the prompt until `quit` or end of input.
///
/// Every command failure is rendered and the loop continues. Lines are decoded
/// leniently, so stray non-UTF-8 bytes become replacement characters. A read
/// error is treated like end of input; a write error is returned.
pub async fn run<R, W>(
    scheduler: &mut Scheduler,
    mut input: R,
    output: &mut W,
    show_banner: bool,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if show_banner {
        write_lines(output, &banner()).await?;
    }
    let mut buf = Vec::new();
    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;
        buf.clear();
        match input.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                tracing::debug!("input closed");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = %err, "failed to read command");
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        let reply = scheduler.handle_line(line).await;
        write_lines(output, &reply.lines).await?;
        if reply.quit {
            break;
        }
    }
    output.flush().await
}

async fn write_lines<W>(output: &mut W, lines: &[String]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    for line in lines {
        output.write_all(line.as_bytes()).await?;
        output.write_all(b"\n").await?;
    }
    Ok(())
}
