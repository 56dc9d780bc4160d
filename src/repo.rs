//! Template repository.
//!
//! Compiled templates are kept in memory by relative path. A lookup of an
//! unmodified template only reads the index. Compiling, recompiling and
//! loading from the on-disk cache happen one at a time, behind a single lock.
mod config;
mod disk;

pub use config::RepositoryConfig;
pub use disk::DiskError;

use crate::{
    compile::{assemble, CompiledTemplate, Generated, Generator, TagLookup},
    escape::RawData,
    extension::{Extension, Extensions},
    fixer::{self, ClassIndex},
    host::{ActionRenderer, Cache, FileResolver, Host, MessageResolver, Validation},
    location::{FileInfo, TemplateLocation, GENERATED_PACKAGE},
    log::{Error, ErrorKind},
    render::TemplateInstance,
    tags::{
        legacy::{LegacyTag, LegacyTagResolver},
        FastTag, FastTagResolver, Tags,
    },
};
use dashmap::DashMap;
use parking_lot::ReentrantMutex;
use serde_json::{Map, Value};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tracing::{debug, trace};

/// A compiled template and the state of its source when it was compiled.
struct Loaded {
    template: Arc<CompiledTemplate>,
    info: Option<FileInfo>,
}

/// Compiles, caches and renders templates.
///
/// A repository is shared by every render: it is `Send` and `Sync`, and a
/// compiled template is immutable once loaded.
///
/// # Examples
///
/// ```
/// use fastergt::{host::MemoryResolver, Repository, Store, TemplateLocation};
///
/// let repository = Repository::default()
///     .with_resolver(MemoryResolver::new().with_template("tags/hello.html", "Hello ${_name}!"));
/// let location = TemplateLocation::embedded_at("views/index.html", "#{hello name: who /}");
///
/// let output = repository.render(&location, Store::new().with_must("who", "World").into());
/// assert_eq!(output.unwrap(), "Hello World!");
/// ```
pub struct Repository {
    config: RepositoryConfig,
    host: Host,
    tags: Tags,
    extensions: Extensions,
    /// Compiled templates by relative path.
    loaded: DashMap<String, Loaded>,
    /// Compiled templates by statement and expression class name.
    classes: DashMap<String, Arc<CompiledTemplate>>,
    /// Held while compiling. Re-entrant, since compiling asks the repository
    /// whether tag-files exist.
    lock: ReentrantMutex<()>,
    compiled: AtomicUsize,
}

impl Repository {
    /// Create a new [`Repository`] with default host collaborators.
    pub fn new(config: RepositoryConfig) -> Self {
        Self {
            config,
            host: Host::default(),
            tags: Tags::default(),
            extensions: Extensions::new(),
            loaded: DashMap::new(),
            classes: DashMap::new(),
            lock: ReentrantMutex::new(()),
            compiled: AtomicUsize::new(0),
        }
    }

    /// Set the [`FileResolver`] used to find templates, tag-files included.
    pub fn with_resolver(mut self, resolver: impl FileResolver + 'static) -> Self {
        self.host.resolver = Arc::new(resolver);
        self
    }

    /// Add a [`FastTagResolver`], consulted after the ones added before it.
    pub fn with_fast_tags(mut self, resolver: impl FastTagResolver + 'static) -> Self {
        self.tags.push_resolver(Arc::new(resolver));
        self
    }

    /// Add a [`LegacyTagResolver`], consulted after every fast-tag resolver.
    pub fn with_legacy_tags(mut self, resolver: impl LegacyTagResolver + 'static) -> Self {
        self.tags.push_legacy(Arc::new(resolver));
        self
    }

    /// Register an extension method available on every value.
    pub fn with_extension<N, E>(mut self, name: N, extension: E) -> Self
    where
        N: Into<String>,
        E: Extension + 'static,
    {
        self.extensions.insert(name, extension);
        self
    }

    pub fn with_action_renderer(mut self, actions: impl ActionRenderer + 'static) -> Self {
        self.host.actions = Arc::new(actions);
        self
    }

    pub fn with_messages(mut self, messages: impl MessageResolver + 'static) -> Self {
        self.host.messages = Arc::new(messages);
        self
    }

    pub fn with_validation(mut self, validation: impl Validation + 'static) -> Self {
        self.host.validation = Arc::new(validation);
        self
    }

    pub fn with_cache(mut self, cache: impl Cache + 'static) -> Self {
        self.host.cache = Arc::new(cache);
        self
    }

    /// Set the [`RawData`] policy deciding which values skip escaping.
    pub fn with_raw_data(mut self, raw: impl RawData + 'static) -> Self {
        self.host.raw = Arc::new(raw);
        self
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Return the number of templates compiled from source so far.
    pub fn compile_count(&self) -> usize {
        self.compiled.load(Ordering::Relaxed)
    }

    /// Return true if the template is loaded, or could be loaded without
    /// compiling anything new in precompiled mode.
    ///
    /// Outside precompiled mode a template exists when its source can be read.
    pub fn template_exists(&self, location: &TemplateLocation) -> bool {
        if self.fresh(location).is_some() {
            return true;
        }
        if self.config.precompiled && !location.is_embedded() {
            return match (self.config.cache_dir.as_deref(), location.class_name()) {
                (Some(root), Ok(class)) => disk::unit_path(root, &class).is_file(),
                _ => false,
            };
        }

        location.probe().is_ok()
    }

    /// Return a [`TemplateInstance`] ready to render the template at the
    /// given location.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the template cannot be found or compiled.
    pub fn get_template_instance(&self, location: &TemplateLocation) -> Result<TemplateInstance<'_>, Error> {
        Ok(TemplateInstance::new(self, self.get_template(location)?))
    }

    /// Render the template at the given location.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the template cannot be found, compiled or
    /// rendered.
    pub fn render(&self, location: &TemplateLocation, args: Map<String, Value>) -> Result<String, Error> {
        self.get_template_instance(location)?.render_to_string(args)
    }

    /// Compile every listed template, storing it in the on-disk cache when
    /// one is configured.
    ///
    /// # Errors
    ///
    /// Returns the [`Error`] of the first template that fails to compile.
    pub fn precompile(&self, locations: &[TemplateLocation]) -> Result<(), Error> {
        let _guard = self.lock.lock();
        for location in locations {
            debug!(template = location.relative_path(), "precompiling");
            let generated = self.generate(location)?;
            if let Some(root) = self.config.cache_dir.as_deref() {
                disk::store(root, location.file_info().and_then(|info| info.modified), &generated)?;
            }
            let template = assemble(location.clone(), &generated, self)?;
            self.remember(location, Arc::new(template));
        }

        Ok(())
    }

    /// Return the compiled template at the given location, compiling it if it
    /// is not loaded or its source changed.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the template cannot be found or compiled.
    pub fn get_template(&self, location: &TemplateLocation) -> Result<Arc<CompiledTemplate>, Error> {
        if let Some(template) = self.fresh(location) {
            trace!(template = location.relative_path(), "cache hit");
            return Ok(template);
        }

        let _guard = self.lock.lock();
        // Another thread may have loaded it while this one waited.
        if let Some(template) = self.fresh(location) {
            return Ok(template);
        }
        if self.loaded.remove(location.relative_path()).is_some() {
            debug!(template = location.relative_path(), "source changed, recompiling");
        }

        let template = Arc::new(self.load(location)?);
        self.remember(location, Arc::clone(&template));

        Ok(template)
    }

    /// Attribute an [`Error`] raised while rendering.
    pub fn fix(&self, error: Error) -> Error {
        fixer::fix(self, error)
    }

    /// Return the loaded template if its source is unchanged.
    fn fresh(&self, location: &TemplateLocation) -> Option<Arc<CompiledTemplate>> {
        let loaded = self.loaded.get(location.relative_path())?;
        let unchanged = !self.config.check_for_changes
            || self.config.precompiled
            || location.is_embedded()
            || loaded.info.is_some() && loaded.info == location.file_info();

        unchanged.then(|| Arc::clone(&loaded.template))
    }

    fn remember(&self, location: &TemplateLocation, template: Arc<CompiledTemplate>) {
        self.classes
            .insert(template.class().to_string(), Arc::clone(&template));
        self.classes
            .insert(template.expressions().class().to_string(), Arc::clone(&template));
        self.loaded.insert(
            location.relative_path().to_string(),
            Loaded {
                template,
                info: location.file_info(),
            },
        );
    }

    /// Load a template from the on-disk cache, or compile it from source.
    fn load(&self, location: &TemplateLocation) -> Result<CompiledTemplate, Error> {
        let class = location.class_name()?;
        let modified = location.file_info().and_then(|info| info.modified);

        let cached = match self.config.cache_dir.as_deref() {
            _ if location.is_embedded() => None,
            root if self.config.precompiled => {
                let generated = match root {
                    Some(root) => disk::load_precompiled(root, &class)?,
                    None => None,
                };
                Some(generated.ok_or_else(|| {
                    Error::not_found(format!("Cannot find template {}", location.relative_path()))
                        .with_help("precompiled mode only loads templates from the unit cache in `cache_dir`")
                })?)
            }
            Some(root) => disk::load(root, &class, modified)?,
            None => None,
        };

        let generated = match cached {
            Some(generated) => generated,
            None => {
                location.probe()?;
                let generated = self.generate(location)?;
                if let (Some(root), false) = (self.config.cache_dir.as_deref(), location.is_embedded()) {
                    disk::store(root, modified, &generated)?;
                }
                generated
            }
        };

        assemble(location.clone(), &generated, self).map_err(|e| e.with_kind(ErrorKind::Compilation))
    }

    /// Generate the artifacts of a template from its source.
    fn generate(&self, location: &TemplateLocation) -> Result<Generated, Error> {
        let source = location.read_source()?;
        let generated = Generator::new(location, self)
            .and_then(|generator| generator.generate(&source))
            .map_err(|e| e.with_kind(ErrorKind::Compilation))?;

        self.compiled.fetch_add(1, Ordering::Relaxed);
        debug!(template = location.relative_path(), class = generated.class.as_str(), "compiled");
        if let Some(root) = self.config.dump_sources_dir.as_deref() {
            disk::dump(root, &generated);
        }

        Ok(generated)
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new(RepositoryConfig::default())
    }
}

impl TagLookup for Repository {
    fn fast_tag(&self, name: &str) -> Option<Arc<dyn FastTag>> {
        self.tags.fast_tag(name)
    }

    fn legacy_tag(&self, name: &str) -> Option<Arc<dyn LegacyTag>> {
        self.tags.legacy_tag(name)
    }

    fn template_exists(&self, relative_path: &str) -> bool {
        self.host.resolver().resolve(relative_path).is_some()
    }
}

impl ClassIndex for Repository {
    fn unit(&self, class: &str) -> Option<Arc<CompiledTemplate>> {
        self.classes.get(class).map(|template| Arc::clone(&template))
    }

    fn is_plumbing(&self, class: &str) -> bool {
        self.config
            .plumbing_namespaces
            .iter()
            .any(|namespace| class.starts_with(namespace.as_str()))
    }

    fn is_application(&self, class: &str) -> bool {
        if class.starts_with(GENERATED_PACKAGE) || self.is_plumbing(class) {
            return false;
        }

        self.config.application_namespaces.is_empty()
            || self
                .config
                .application_namespaces
                .iter()
                .any(|namespace| class.starts_with(namespace.as_str()))
    }
}
