//! Command handlers. Each one mirrors a page of the web client: load what
//! the page shows, perform the action, then reconcile the local copy.

use std::io::{self, BufRead, Write};

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, warn};

use learnplus_core::models::{Course, Enrollment};
use learnplus_core::reconcile::{apply_lesson_completed, apply_unenroll, CatalogView, View};
use learnplus_core::utils::{find_by_slug, truncate_string, Slugged};
use learnplus_core::{ApiClient, Config, EnrollmentGateway, SessionStatus, SessionStore};

use crate::{Command, Credentials};

/// Max description length in listings
const DESCRIPTION_WIDTH: usize = 60;

pub async fn run(command: Command, config: Config, api_url: Option<String>) -> Result<()> {
    let api_url = api_url.unwrap_or_else(|| config.api_url());
    debug!(api_url = %api_url, "Using backend");

    let api = ApiClient::with_timeout(&api_url, config.request_timeout())?;
    let session =
        SessionStore::with_refresh_interval(api, config.token_store()?, config.refresh_interval());
    session.restore();

    // A stored token may have outlived its refresh interval between runs
    if let Err(e) = session.refresh_if_stale().await {
        if command.needs_session() {
            return Err(e.into());
        }
        warn!(error = %e, "Stored session could not be refreshed");
    }

    let mut app = App {
        config,
        gateway: EnrollmentGateway::for_session(session),
    };
    let result = app.dispatch(command).await;
    app.session().shutdown();
    result
}

impl Command {
    /// Commands that cannot do anything useful without a session.
    fn needs_session(&self) -> bool {
        matches!(
            self,
            Command::Enroll { .. }
                | Command::Enrollments
                | Command::Enrollment { .. }
                | Command::Complete { .. }
                | Command::Unenroll { .. }
                | Command::Keepalive
        )
    }
}

struct App {
    config: Config,
    gateway: EnrollmentGateway,
}

impl App {
    fn session(&self) -> &SessionStore {
        self.gateway.session()
    }

    fn api(&self) -> &ApiClient {
        self.session().api()
    }

    async fn dispatch(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Signup(creds) => self.sign_up(creds).await,
            Command::Signin(creds) => self.sign_in(creds).await,
            Command::Signout => {
                self.session().sign_out();
                println!("Signed out");
                Ok(())
            }
            Command::Status => {
                self.status();
                Ok(())
            }
            Command::Courses => self.courses().await,
            Command::Course { slug } => self.course(&slug).await,
            Command::Enroll { slug } => self.enroll(&slug).await,
            Command::Enrollments => self.enrollments().await,
            Command::Enrollment { slug } => self.enrollment(&slug).await,
            Command::Complete { slug, lesson } => self.complete(&slug, &lesson).await,
            Command::Unenroll { slug } => self.unenroll(&slug).await,
            Command::Keepalive => self.keepalive().await,
        }
    }

    // ===== Account =====

    async fn sign_up(&mut self, creds: Credentials) -> Result<()> {
        let (username, password) = self.credentials(creds)?;
        let message = self.session().sign_up(&username, &password).await?;
        println!("{}", message);
        println!("Run `learnplus signin` to continue.");
        Ok(())
    }

    async fn sign_in(&mut self, creds: Credentials) -> Result<()> {
        let (username, password) = self.credentials(creds)?;
        self.session().sign_in(&username, &password).await?;
        println!("Signed in as {}", username);

        self.config.last_username = Some(username);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
        Ok(())
    }

    fn status(&self) {
        println!("Backend: {}", self.api().base_url());
        let session = self.session().session();
        if !session.is_authenticated() {
            println!("Not signed in");
            return;
        }
        println!("Signed in as {}", session.username().unwrap_or("(unknown user)"));
        if !self.session().has_refresh_credential() {
            println!("No refresh credential: the session ends at the next refresh");
        }
    }

    fn credentials(&self, creds: Credentials) -> Result<(String, String)> {
        let username = match creds.username {
            Some(username) => username,
            None => match self.config.last_username.as_deref() {
                Some(last) => {
                    let entered = prompt(&format!("Username [{}]: ", last))?;
                    if entered.is_empty() {
                        last.to_string()
                    } else {
                        entered
                    }
                }
                None => prompt("Username: ")?,
            },
        };
        let password = match creds.password {
            Some(password) => password,
            None => rpassword::prompt_password("Password: ").context("Failed to read password")?,
        };
        Ok((username, password))
    }

    // ===== Catalog =====

    async fn courses(&self) -> Result<()> {
        let (courses, enrollments) = if self.session().is_authenticated() {
            let (courses, enrollments) =
                futures::join!(self.api().fetch_courses(), self.gateway.list_enrollments());
            let enrollments = enrollments.unwrap_or_else(|e| {
                warn!(error = %e, "Could not load enrollments");
                Vec::new()
            });
            (courses?, enrollments)
        } else {
            (self.api().fetch_courses().await?, Vec::new())
        };

        let catalog = CatalogView::new(courses, &enrollments);
        if catalog.courses.is_empty() {
            println!("No courses available");
            return Ok(());
        }
        for course in &catalog.courses {
            let marker = if catalog.is_enrolled(&course.id) { "*" } else { " " };
            println!(
                "{} {:<32} {:>5} enrolled  {}",
                marker,
                course.slug(),
                course.enrollments_count,
                truncate_string(&course.title, DESCRIPTION_WIDTH),
            );
        }
        if !enrollments.is_empty() {
            println!("\n* enrolled");
        }
        Ok(())
    }

    async fn course(&self, slug: &str) -> Result<()> {
        let courses = self.api().fetch_courses().await?;
        let course = find_course(&courses, slug)?;

        println!("{}", course.title);
        println!("{}", course.description);
        if !course.tags.is_empty() {
            println!("Tags: {}", course.tags_display());
        }
        println!("Learners: {}", course.enrollments_count);
        println!("Lessons:");
        for (i, lesson) in course.lessons.iter().enumerate() {
            println!("  {:>2}. {}", i + 1, lesson.title);
        }
        Ok(())
    }

    async fn enroll(&self, slug: &str) -> Result<()> {
        let courses = self.api().fetch_courses().await?;
        let course_id = find_course(&courses, slug)?.id.clone();

        self.gateway.enroll(&course_id).await?;

        let mut catalog = CatalogView::new(courses, &[]);
        catalog.apply_enroll(&course_id);
        if let Some(course) = catalog.courses.iter().find(|c| c.id == course_id) {
            println!(
                "Enrolled in {} ({} learners)",
                course.title, course.enrollments_count
            );
        }
        Ok(())
    }

    // ===== Enrollments =====

    async fn enrollments(&self) -> Result<()> {
        let enrollments = self.gateway.list_enrollments().await?;
        if enrollments.is_empty() {
            println!("No enrollments yet. Browse with `learnplus courses`.");
            return Ok(());
        }
        for enrollment in &enrollments {
            println!(
                "{:<32} {:<12} {}",
                enrollment.slug(),
                enrollment.status.label(),
                enrollment.progress_display(),
            );
        }
        Ok(())
    }

    async fn enrollment(&self, slug: &str) -> Result<()> {
        let enrollment = self.gateway.find_enrollment_by_slug(slug).await?;
        print_enrollment(&enrollment);
        Ok(())
    }

    async fn complete(&self, slug: &str, lesson_key: &str) -> Result<()> {
        let enrollment = self.gateway.find_enrollment_by_slug(slug).await?;
        let lesson_id = enrollment
            .find_lesson(lesson_key)
            .map(|l| l.id.clone())
            .ok_or_else(|| anyhow!("No lesson '{}' in {}", lesson_key, enrollment.course.title))?;

        let view = View::new(enrollment);
        let handle = view.handle();

        self.gateway
            .complete_lesson_progress(&view.read(|e| e.id.clone()), &lesson_id)
            .await?;

        if let Some(Err(e)) = handle.apply(|e| apply_lesson_completed(e, &lesson_id)) {
            warn!(error = %e, "Could not update local progress");
        }
        view.read(|e| {
            println!("Lesson complete. {}: {}", e.course.title, e.progress_display());
            if e.status.is_completed() {
                println!("Course completed!");
            }
        });
        Ok(())
    }

    async fn unenroll(&self, slug: &str) -> Result<()> {
        let mut enrollments = self.gateway.list_enrollments().await?;
        let enrollment_id = find_by_slug(&enrollments, slug)
            .map(|e| e.id.clone())
            .ok_or_else(|| anyhow!("No enrollment for course '{}'", slug))?;

        self.gateway.unenroll(&enrollment_id).await?;

        if let Some(removed) = apply_unenroll(&mut enrollments, &enrollment_id) {
            println!(
                "Unenrolled from {} ({} enrollments remaining)",
                removed.course.title,
                enrollments.len()
            );
        }
        Ok(())
    }

    // ===== Session =====

    async fn keepalive(&self) -> Result<()> {
        if !self.session().is_authenticated() {
            bail!("Not signed in");
        }
        if !self.session().has_refresh_credential() {
            warn!("No refresh credential; the session will expire at the next refresh");
        }

        let mut status = self.session().subscribe();
        println!("Keeping session alive. Press Ctrl-C to stop.");

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                println!("Stopped");
                Ok(())
            }
            changed = status.wait_for(|s| *s != SessionStatus::SignedIn) => {
                match changed.map(|s| *s) {
                    Ok(SessionStatus::Expired) => bail!("Session expired - please sign in again"),
                    _ => {
                        println!("Signed out");
                        Ok(())
                    }
                }
            }
        }
    }
}

fn find_course<'a>(courses: &'a [Course], slug: &str) -> Result<&'a Course> {
    find_by_slug(courses, slug).ok_or_else(|| anyhow!("No course matches '{}'", slug))
}

fn print_enrollment(enrollment: &Enrollment) {
    println!("{}", enrollment.course.title);
    println!(
        "Status: {}  Progress: {}",
        enrollment.status.label(),
        enrollment.progress_display()
    );
    for (i, lesson) in enrollment.lesson_progress.iter().enumerate() {
        let check = if lesson.status.is_completed() { "x" } else { " " };
        println!("  [{}] {:>2}. {}  ({})", check, i + 1, lesson.title, lesson.id);
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read input")?;
    Ok(line.trim().to_string())
}
