use dialoguer::{theme::ColorfulTheme, Confirm, Input, Password};
use std::path::PathBuf;
use std::sync::Arc;

use crate::client::{HttpTransport, JobClient, JobProgress, PollOptions};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::gallery::{GalleryFilter, GalleryService};
use crate::generate::{DetailerOptions, EditOptions, GenerateOptions, StudioService};
use crate::queue::QueueService;
use crate::store::{CharacterProfile, PromptTemplate, SettingsPatch, StudioStore};
use crate::ui::UI;
use crate::version::CURRENT_VERSION;
use crate::{
    BatchArgs, CharacterCommand, Commands, ConfigCommand, DetailerArgs, EditArgs, GalleryCommand,
    GenerateArgs, LoginArgs, QueueCommand, TemplateCommand,
};

/// CLI handler for processing commands
pub struct CliHandler {
    data_dir: PathBuf,
    store: Arc<StudioStore>,
    ui: UI,
}

impl CliHandler {
    /// Create a handler over the default data dir, or a custom one in tests
    pub fn new(data_dir: Option<PathBuf>) -> Self {
        let data_dir = data_dir.unwrap_or_else(crate::config::default_data_dir);
        Self {
            store: Arc::new(StudioStore::open(&data_dir)),
            data_dir,
            ui: UI::new(),
        }
    }

    /// Client configuration from the settings slice; `FLUXSTUDIO_*`
    /// environment variables win over stored credentials
    fn client_config(&self) -> Result<ClientConfig> {
        let settings = self.store.settings.snapshot();
        ClientConfig::builder()
            .api_key(settings.api_key)
            .endpoint_id(settings.endpoint_id)
            .build()
    }

    fn studio(&self) -> Result<StudioService<HttpTransport>> {
        let config = self.client_config()?;
        let options = PollOptions::from_config(&config);
        let client = JobClient::connect(config)?;
        Ok(StudioService::new(self.store.clone(), client, options))
    }

    fn gallery(&self) -> GalleryService {
        GalleryService::new(self.store.clone())
    }

    fn queue(&self) -> QueueService {
        QueueService::new(self.store.clone())
    }

    fn output_dir(&self, explicit: Option<PathBuf>) -> PathBuf {
        explicit.unwrap_or_else(|| self.data_dir.join("outputs"))
    }

    /// Execute a CLI command
    pub async fn execute(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Generate(args) => self.handle_generate(args).await,
            Commands::Edit(args) => self.handle_edit(args).await,
            Commands::Detailer(args) => self.handle_detailer(args).await,
            Commands::Batch(args) => self.handle_batch(args).await,
            Commands::Status => self.handle_status().await,
            Commands::Login(args) => self.handle_login(args),
            Commands::Logout => self.handle_logout(),
            Commands::Config(args) => self.handle_config(args.command),
            Commands::Gallery(args) => self.handle_gallery(args.command),
            Commands::Queue(args) => self.handle_queue(args.command),
            Commands::Character(args) => self.handle_character(args.command),
            Commands::Template(args) => self.handle_template(args.command),
        }
    }

    /// Handle generate command
    async fn handle_generate(&mut self, args: GenerateArgs) -> Result<()> {
        let service = self.studio()?;
        let opts = GenerateOptions {
            prompt: args.prompt,
            negative_prompt: args.negative,
            width: args.width,
            height: args.height,
            steps: args.steps,
            seed: args.seed,
            template: args.template,
            reference_image: args.reference_image,
            pose_image: args.pose_image,
            depth_image: args.depth_image,
            canny_image: args.canny_image,
            controlnet_strength: args.controlnet_strength,
            upscale: args.upscale,
            detail_daemon: args.detail_daemon,
            lora_url: args.lora_url,
            lora_name: args.lora_name,
            no_character: args.no_character,
        };
        let request = service.build_generate_request(&opts)?;
        let output_dir = self.output_dir(args.output);

        let spinner = crate::ui::create_spinner("submitting");
        let outcome = service
            .run_job(request, args.sync, &output_dir, |progress| {
                spinner.set_message(progress.as_str().to_string());
            })
            .await;
        spinner.finish_and_clear();
        let outcome = outcome?;

        self.ui
            .success(&format!("Generated {} image(s)", outcome.files.len()));
        for file in &outcome.files {
            println!("  {}", file.display());
        }
        self.ui.status("Seed", &outcome.seed.to_string(), true);
        Ok(())
    }

    /// Handle edit command
    async fn handle_edit(&mut self, args: EditArgs) -> Result<()> {
        let service = self.studio()?;
        let opts = EditOptions {
            prompt: args.prompt,
            input_image: args.input_image,
            denoise: args.denoise,
            steps: args.steps,
            seed: args.seed,
            upscale: args.upscale,
            no_character: args.no_character,
        };
        let request = service.build_edit_request(&opts)?;
        let output_dir = self.output_dir(args.output);

        let spinner = crate::ui::create_spinner("submitting");
        let outcome = service
            .run_job(request, args.sync, &output_dir, |progress| {
                spinner.set_message(progress.as_str().to_string());
            })
            .await;
        spinner.finish_and_clear();
        let outcome = outcome?;

        self.ui
            .success(&format!("Edited image saved ({} file(s))", outcome.files.len()));
        for file in &outcome.files {
            println!("  {}", file.display());
        }
        Ok(())
    }

    /// Handle detailer command
    async fn handle_detailer(&mut self, args: DetailerArgs) -> Result<()> {
        let service = self.studio()?;
        let opts = DetailerOptions {
            input_image: args.input_image,
            denoise: args.denoise,
            scale_by: args.scale_by,
            seed: args.seed,
        };
        let request = service.build_detailer_request(&opts)?;
        let output_dir = self.output_dir(args.output);

        let spinner = crate::ui::create_spinner("submitting");
        let outcome = service
            .run_job(request, args.sync, &output_dir, |progress| {
                spinner.set_message(progress.as_str().to_string());
            })
            .await;
        spinner.finish_and_clear();
        let outcome = outcome?;

        self.ui.success("Face detail pass complete");
        for file in &outcome.files {
            println!("  {}", file.display());
        }
        Ok(())
    }

    /// Handle batch command: n sequential generate jobs
    async fn handle_batch(&mut self, args: BatchArgs) -> Result<()> {
        let service = self.studio()?;
        let opts = GenerateOptions {
            prompt: args.prompt,
            negative_prompt: args.negative,
            width: args.width,
            height: args.height,
            steps: args.steps,
            seed: args.seed,
            template: args.template,
            no_character: args.no_character,
            ..Default::default()
        };
        let output_dir = self.output_dir(args.output);

        let bar = crate::ui::create_progress_bar(args.count as u64, "generating");
        let report = service
            .batch(&opts, args.count, &output_dir, |index, progress| {
                bar.set_message(format!("job {}: {}", index + 1, progress.as_str()));
                if progress == JobProgress::Completed {
                    bar.inc(1);
                }
            })
            .await;
        bar.finish_and_clear();
        let report = report?;

        self.ui.success(&format!(
            "Batch finished: {} completed, {} failed",
            report.completed.len(),
            report.failures.len()
        ));
        for (index, err) in &report.failures {
            self.ui.warning(&format!("  job {}: {}", index + 1, err));
        }
        Ok(())
    }

    /// Handle status command: credentials + endpoint health card
    async fn handle_status(&mut self) -> Result<()> {
        let settings = self.store.settings.snapshot();
        let configured = settings.is_configured();

        let mut rows = vec![
            ("Version", CURRENT_VERSION.to_string()),
            ("Credentials", self.ui.format_credential_status(configured)),
        ];

        if configured {
            rows.push(("Endpoint", settings.endpoint_id.clone()));
            match self.studio() {
                Ok(service) => match service.client().health().await {
                    Ok(health) => {
                        rows.push(("Connection", self.ui.format_endpoint_status(true)));
                        rows.push(("Jobs queued", health.queue_depth().to_string()));
                        rows.push(("Workers", health.total_workers().to_string()));
                    }
                    Err(err) => {
                        rows.push((
                            "Connection",
                            format!("{} ({})", self.ui.format_endpoint_status(false), err),
                        ));
                    }
                },
                Err(err) => {
                    rows.push(("Connection", err.to_string()));
                }
            }
        }

        self.ui.card("Status", rows);
        Ok(())
    }

    /// Handle login command: store credentials, prompting when not given
    fn handle_login(&mut self, args: LoginArgs) -> Result<()> {
        let current = self.store.settings.snapshot();

        let endpoint_id = match args.endpoint_id {
            Some(id) => id,
            None => Input::with_theme(&ColorfulTheme::default())
                .with_prompt("Endpoint id")
                .with_initial_text(current.endpoint_id.clone())
                .interact_text()?,
        };
        let api_key = match args.api_key {
            Some(key) => key,
            None => Password::with_theme(&ColorfulTheme::default())
                .with_prompt("API key")
                .interact()?,
        };

        self.store.update_settings(SettingsPatch {
            api_key: Some(api_key),
            endpoint_id: Some(endpoint_id),
            ..Default::default()
        });
        self.ui.success("Credentials saved");
        Ok(())
    }

    /// Handle logout command
    fn handle_logout(&mut self) -> Result<()> {
        if !self.store.settings.snapshot().is_configured() {
            self.ui.info("No credentials stored");
            return Ok(());
        }
        self.store.update_settings(SettingsPatch {
            api_key: Some(String::new()),
            endpoint_id: Some(String::new()),
            ..Default::default()
        });
        self.ui.success("Credentials removed");
        Ok(())
    }

    /// Handle config command
    fn handle_config(&mut self, command: ConfigCommand) -> Result<()> {
        match command {
            ConfigCommand::Show => {
                let settings = self.store.settings.snapshot();
                self.ui.card(
                    "Configuration",
                    vec![
                        (
                            "Credentials",
                            self.ui.format_credential_status(settings.is_configured()),
                        ),
                        ("Locale", settings.locale.clone()),
                        ("Width", settings.defaults.width.to_string()),
                        ("Height", settings.defaults.height.to_string()),
                        ("Steps", settings.defaults.steps.to_string()),
                        ("Seed", settings.defaults.seed.to_string()),
                        ("Denoise", settings.defaults.denoise.to_string()),
                        ("Data dir", self.data_dir.display().to_string()),
                    ],
                );
            }
            ConfigCommand::Set {
                width,
                height,
                steps,
                seed,
                denoise,
                locale,
            } => {
                self.store.update_settings(SettingsPatch {
                    width,
                    height,
                    steps,
                    seed,
                    denoise,
                    ..Default::default()
                });
                if let Some(locale) = locale {
                    self.store.set_locale(locale);
                }
                self.ui.success("Configuration updated");
            }
            ConfigCommand::Reset => {
                let proceed = Confirm::with_theme(&ColorfulTheme::default())
                    .with_prompt("Reset all settings (including credentials)?")
                    .default(false)
                    .interact()?;
                if proceed {
                    self.store.reset_settings();
                    self.ui.success("Settings reset to defaults");
                }
            }
        }
        Ok(())
    }

    /// Handle gallery commands
    fn handle_gallery(&mut self, command: GalleryCommand) -> Result<()> {
        let gallery = self.gallery();
        match command {
            GalleryCommand::List {
                kind,
                favorites,
                search,
            } => {
                let images = gallery.list(&GalleryFilter {
                    kind,
                    favorites_only: favorites,
                    search,
                });
                if images.is_empty() {
                    self.ui.info("Gallery is empty");
                    return Ok(());
                }
                for image in &images {
                    let marker = if image.favorite { "*" } else { " " };
                    // decoded payload size, approximated from the base64 length
                    let size = crate::ui::format_bytes(image.image.len() as u64 * 3 / 4);
                    println!(
                        "{} {}  {}  seed {}  {}  {}  {}",
                        marker,
                        image.id,
                        image.kind,
                        image.seed,
                        size,
                        image.created_at.format("%Y-%m-%d %H:%M"),
                        image.prompt
                    );
                }
            }
            GalleryCommand::Search { query } => {
                return self.handle_gallery(GalleryCommand::List {
                    kind: None,
                    favorites: false,
                    search: Some(query),
                });
            }
            GalleryCommand::Favorite { id } => {
                let favorite = gallery.toggle_favorite(id)?;
                self.ui.success(if favorite {
                    "Marked as favorite"
                } else {
                    "Removed favorite mark"
                });
            }
            GalleryCommand::Remove { ids } => {
                let removed = gallery.remove_many(&ids);
                self.ui
                    .success(&format!("Removed {} of {} image(s)", removed, ids.len()));
            }
            GalleryCommand::Clear { force } => {
                let proceed = force
                    || Confirm::with_theme(&ColorfulTheme::default())
                        .with_prompt("Delete every image in the gallery?")
                        .default(false)
                        .interact()?;
                if proceed {
                    gallery.clear();
                    self.ui.success("Gallery cleared");
                }
            }
            GalleryCommand::Export { ids, output } => {
                let images = if ids.is_empty() {
                    gallery.list(&GalleryFilter::default())
                } else {
                    ids.iter()
                        .map(|id| gallery.get(*id))
                        .collect::<Result<Vec<_>>>()?
                };
                let output = self.output_dir(output);
                let report = gallery.export(&images, &output)?;
                self.ui.success(&format!(
                    "Exported {} image(s) to {}",
                    report.written.len(),
                    output.display()
                ));
                for failure in &report.failures {
                    self.ui
                        .warning(&format!("  {}: {}", failure.id, failure.reason));
                }
            }
            GalleryCommand::Collect { name, ids } => {
                let added = gallery.collect(&name, &ids)?;
                self.ui
                    .success(&format!("Added {} image(s) to '{}'", added, name));
            }
            GalleryCommand::Collections => {
                let collections = gallery.collections();
                if collections.is_empty() {
                    self.ui.info("No collections");
                    return Ok(());
                }
                for collection in &collections {
                    println!(
                        "{}  ({} images)",
                        collection.name,
                        collection.image_ids.len()
                    );
                }
            }
        }
        Ok(())
    }

    /// Handle queue commands
    fn handle_queue(&mut self, command: QueueCommand) -> Result<()> {
        let queue = self.queue();
        match command {
            QueueCommand::List => {
                let jobs = queue.list();
                if jobs.is_empty() {
                    self.ui.info("No jobs tracked in this session");
                    return Ok(());
                }
                for job in &jobs {
                    println!(
                        "{}  {}  {}  {}",
                        self.ui.format_job_state(job.state),
                        job.kind,
                        self.ui.format_field(job.remote_id.clone()),
                        job.label
                    );
                    if let Some(error) = &job.error {
                        println!("    {}", error);
                    }
                }
            }
            QueueCommand::Clear => {
                queue.clear_completed();
                self.ui.success("Finished jobs cleared");
            }
        }
        Ok(())
    }

    /// Handle character commands
    fn handle_character(&mut self, command: CharacterCommand) -> Result<()> {
        match command {
            CharacterCommand::Show => match self.store.character.snapshot().profile {
                Some(profile) => {
                    self.ui.card(
                        "Character",
                        vec![
                            ("Name", profile.name.clone()),
                            ("Persona", self.ui.format_field(profile.persona.clone())),
                            ("Face LoRA", self.ui.format_field(profile.face_lora.clone())),
                            (
                                "LoRA strength",
                                self.ui.format_field(
                                    profile.face_lora_strength.map(|s| s.to_string()),
                                ),
                            ),
                            ("Face mode", self.ui.format_field(profile.face_mode.clone())),
                            (
                                "Reference image",
                                if profile.reference_image.is_some() {
                                    "set".to_string()
                                } else {
                                    "-".to_string()
                                },
                            ),
                        ],
                    );
                }
                None => self.ui.info("No character profile set"),
            },
            CharacterCommand::Set {
                name,
                persona,
                face_lora,
                face_lora_strength,
                face_mode,
                reference_image,
            } => {
                let reference_image = reference_image
                    .map(|path| crate::generate::encode_image(&path))
                    .transpose()?;
                self.store.set_character(CharacterProfile {
                    name: name.clone(),
                    persona,
                    face_lora,
                    face_lora_strength,
                    face_mode,
                    reference_image,
                });
                self.ui.success(&format!("Character '{}' saved", name));
            }
            CharacterCommand::Clear => {
                self.store.clear_character();
                self.ui.success("Character profile cleared");
            }
        }
        Ok(())
    }

    /// Handle template commands
    fn handle_template(&mut self, command: TemplateCommand) -> Result<()> {
        match command {
            TemplateCommand::List => {
                let templates = self.store.templates.snapshot().templates;
                if templates.is_empty() {
                    self.ui.info("No templates saved");
                    return Ok(());
                }
                for template in &templates {
                    println!("{}: {}", template.name, template.prompt);
                    if let Some(negative) = &template.negative_prompt {
                        println!("    negative: {}", negative);
                    }
                }
            }
            TemplateCommand::Add {
                name,
                prompt,
                negative,
            } => {
                self.store.add_template(PromptTemplate {
                    name: name.clone(),
                    prompt,
                    negative_prompt: negative,
                });
                self.ui.success(&format!("Template '{}' saved", name));
            }
            TemplateCommand::Remove { name } => {
                if self.store.remove_template(&name) {
                    self.ui.success(&format!("Template '{}' removed", name));
                } else {
                    self.ui.warning(&format!("No template named '{}'", name));
                }
            }
        }
        Ok(())
    }
}
