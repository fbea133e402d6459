//! Press Here entry point
//!
//! On the web this wires the DOM, device motion and audio into a
//! [`Session`](press_here::Session). Natively it replays a scripted session
//! against a logging surface.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
mod web {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    use glam::Vec2;
    use wasm_bindgen::prelude::*;
    use wasm_bindgen_futures::{JsFuture, spawn_local};
    use web_sys::{DeviceMotionEvent, Document, Element, Event, HtmlElement, Window};

    use press_here::audio::AudioManager;
    use press_here::consts::MARKER_SIZE_PX;
    use press_here::sim::{InputEvent, MarkerColor, MarkerId, MotionSample, Session, SurfaceHandle};
    use press_here::surface::{AudioFeedback, Instruction, MarkerSpawn, RenderSurface, SoundClip};
    use press_here::{ContainerBounds, Settings};

    // iOS gates device motion behind an explicit permission prompt
    #[wasm_bindgen(inline_js = "
        export function motion_supported() {
            return typeof DeviceMotionEvent !== 'undefined';
        }

        export function motion_needs_permission() {
            return typeof DeviceMotionEvent !== 'undefined'
                && typeof DeviceMotionEvent.requestPermission === 'function';
        }

        export function request_motion_permission() {
            return DeviceMotionEvent.requestPermission()
                .then(state => state === 'granted')
                .catch(() => false);
        }
    ")]
    extern "C" {
        fn motion_supported() -> bool;
        fn motion_needs_permission() -> bool;
        fn request_motion_permission() -> js_sys::Promise;
    }

    const HAPTIC_PATTERN: [u32; 3] = [30, 50, 30];
    const COUNTER_LIFETIME_MS: i32 = 800;

    /// Markers as absolutely positioned divs inside the container
    struct DomSurface {
        document: Document,
        container: HtmlElement,
        instruction: Option<Element>,
        markers: HashMap<SurfaceHandle, HtmlElement>,
        next_handle: u64,
        haptics: bool,
        reduced_motion: bool,
    }

    impl DomSurface {
        fn new(document: Document, container: HtmlElement, settings: &Settings) -> Self {
            let instruction = document.get_element_by_id("instruction");
            if instruction.is_none() {
                log::warn!("No #instruction element; instructions only go to the log");
            }
            Self {
                document,
                container,
                instruction,
                markers: HashMap::new(),
                next_handle: 0,
                haptics: settings.haptics,
                reduced_motion: settings.reduced_motion,
            }
        }

        fn div(&self, class: &str) -> Option<HtmlElement> {
            let element = self.document.create_element("div").ok()?.dyn_into::<HtmlElement>().ok()?;
            element.set_class_name(class);
            Some(element)
        }

        /// Center an element on a percentage position
        fn place(element: &HtmlElement, position: Vec2) {
            let style = element.style();
            let _ = style.set_property("left", &format!("{}%", position.x));
            let _ = style.set_property("top", &format!("{}%", position.y));
            let _ = style.set_property("transform", "translate(-50%, -50%)");
        }

        fn vibrate(&self) {
            if !self.haptics {
                return;
            }
            if let Some(window) = web_sys::window() {
                let pattern: js_sys::Array = HAPTIC_PATTERN.iter().map(|ms| JsValue::from(*ms)).collect();
                let _ = window.navigator().vibrate_with_pattern(&pattern);
            }
        }
    }

    impl RenderSurface for DomSurface {
        fn create_marker(&mut self, spawn: &MarkerSpawn) -> SurfaceHandle {
            self.next_handle += 1;
            let handle = SurfaceHandle(self.next_handle);

            let Some(element) = self.div(&format!("button {}", spawn.color.as_str())) else {
                log::error!("Could not create element for {}", spawn.id);
                return handle;
            };
            let _ = element.set_attribute("data-marker", &spawn.id.0.to_string());
            let style = element.style();
            let size = format!("{}px", MARKER_SIZE_PX);
            let _ = style.set_property("width", &size);
            let _ = style.set_property("height", &size);
            Self::place(&element, spawn.position);

            if !spawn.reveal_after.is_zero() {
                let _ = style.set_property("animation-delay", &format!("{}ms", spawn.reveal_after.as_millis()));
                let _ = element.class_list().add_1("reveal");
            }

            let _ = self.container.append_child(&element);
            self.markers.insert(handle, element);
            handle
        }

        fn remove_marker(&mut self, handle: SurfaceHandle) {
            if let Some(element) = self.markers.remove(&handle) {
                element.remove();
            }
        }

        fn move_marker(&mut self, handle: SurfaceHandle, position: Vec2) {
            if let Some(element) = self.markers.get(&handle) {
                Self::place(element, position);
            }
        }

        fn recolor_marker(&mut self, handle: SurfaceHandle, color: MarkerColor) {
            if let Some(element) = self.markers.get(&handle) {
                let classes = element.class_list();
                let _ = classes.remove_3("yellow", "red", "blue");
                let _ = classes.add_1(color.as_str());
            }
        }

        fn show_counter(&mut self, position: Vec2, count: u32) {
            let Some(badge) = self.div("counter") else { return };
            badge.set_text_content(Some(&format!("+{}", count)));
            Self::place(&badge, position);
            let _ = self.container.append_child(&badge);

            let Some(window) = web_sys::window() else { return };
            let expire = Closure::once_into_js(move || badge.remove());
            let _ = window
                .set_timeout_with_callback_and_timeout_and_arguments_0(expire.unchecked_ref(), COUNTER_LIFETIME_MS);
        }

        fn set_text(&mut self, instruction: Instruction) {
            log::info!("\"{}\"", instruction.text());
            if let Some(element) = &self.instruction {
                element.set_text_content(Some(instruction.text()));
            }
            self.vibrate();
        }

        fn set_background(&mut self, color: &str) {
            if let Some(body) = self.document.body() {
                let _ = body.style().set_property("background-color", color);
            }
        }

        fn rotate(&mut self, degrees: f32) {
            if self.reduced_motion {
                log::debug!("Skipping rotation to {}deg (reduced motion)", degrees);
                return;
            }
            let _ = self
                .container
                .style()
                .set_property("transform", &format!("rotate({}deg)", degrees));
        }
    }

    /// Surface plus whatever audio the browser allowed
    struct Page {
        surface: DomSurface,
        audio: Option<AudioManager>,
    }

    impl RenderSurface for Page {
        fn create_marker(&mut self, spawn: &MarkerSpawn) -> SurfaceHandle {
            self.surface.create_marker(spawn)
        }

        fn remove_marker(&mut self, handle: SurfaceHandle) {
            self.surface.remove_marker(handle);
        }

        fn move_marker(&mut self, handle: SurfaceHandle, position: Vec2) {
            self.surface.move_marker(handle, position);
        }

        fn recolor_marker(&mut self, handle: SurfaceHandle, color: MarkerColor) {
            self.surface.recolor_marker(handle, color);
        }

        fn show_counter(&mut self, position: Vec2, count: u32) {
            self.surface.show_counter(position, count);
        }

        fn set_text(&mut self, instruction: Instruction) {
            self.surface.set_text(instruction);
        }

        fn set_background(&mut self, color: &str) {
            self.surface.set_background(color);
        }

        fn rotate(&mut self, degrees: f32) {
            self.surface.rotate(degrees);
        }
    }

    impl AudioFeedback for Page {
        fn play(&mut self, clip: SoundClip) {
            if let Some(audio) = self.audio.as_mut() {
                audio.play(clip);
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum AudioState {
        Idle,
        Starting,
        Ready,
        Failed,
    }

    struct App {
        session: Session,
        page: Page,
        settings: Settings,
        audio: AudioState,
        /// The retry nudge replaced the instruction text
        nudged: bool,
    }

    impl App {
        fn dispatch(&mut self, event: InputEvent) {
            let App { session, page, .. } = self;
            session.handle(event, page);
        }
    }

    /// Create audio on a user gesture; on failure show the retry nudge
    fn start_audio(app: &Rc<RefCell<App>>) {
        let unlock = {
            let mut guard = app.borrow_mut();
            let a = &mut *guard;
            if matches!(a.audio, AudioState::Starting | AudioState::Ready) {
                return;
            }
            match AudioManager::new(&a.settings) {
                Ok(manager) => {
                    let unlock = manager.unlock();
                    a.page.audio = Some(manager);
                    a.audio = AudioState::Starting;
                    unlock
                }
                Err(e) => {
                    log::warn!("{}", e);
                    a.audio = AudioState::Failed;
                    a.nudged = true;
                    a.session.notify_audio_unavailable(&mut a.page);
                    return;
                }
            }
        };

        let app = app.clone();
        spawn_local(async move {
            let result = unlock.await;
            let mut guard = app.borrow_mut();
            let a = &mut *guard;
            match result {
                Ok(()) => {
                    log::info!("Audio unlocked");
                    a.audio = AudioState::Ready;
                    if a.nudged {
                        a.nudged = false;
                        let instruction = a.session.instruction();
                        a.page.set_text(instruction);
                    }
                }
                Err(e) => {
                    log::warn!("{}", e);
                    a.audio = AudioState::Failed;
                    a.page.audio = None;
                    a.nudged = true;
                    a.session.notify_audio_unavailable(&mut a.page);
                }
            }
        });
    }

    fn marker_from_event(event: &Event) -> Option<MarkerId> {
        let target: Element = event.target()?.dyn_into().ok()?;
        let marker = target.closest("[data-marker]").ok()??;
        marker.get_attribute("data-marker")?.parse().ok().map(MarkerId)
    }

    /// One delegated listener per event kind; handlers live as long as the
    /// container, and removed markers simply stop matching
    fn setup_marker_handlers(container: &HtmlElement, app: Rc<RefCell<App>>) {
        let kinds: [(&str, fn(MarkerId) -> InputEvent, bool); 3] = [
            ("click", InputEvent::Click, true),
            ("touchstart", InputEvent::Touch, true),
            ("mouseover", InputEvent::Touch, false),
        ];

        for (kind, to_event, gesture) in kinds {
            let app = app.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |event: Event| {
                if gesture {
                    start_audio(&app);
                }
                if let Some(id) = marker_from_event(&event) {
                    app.borrow_mut().dispatch(to_event(id));
                }
            });
            let _ = container.add_event_listener_with_callback(kind, closure.as_ref().unchecked_ref());
            closure.forget();
        }
    }

    fn setup_motion(window: &Window, app: Rc<RefCell<App>>) {
        let closure = Closure::<dyn FnMut(_)>::new(move |event: DeviceMotionEvent| {
            let Some(acceleration) = event.acceleration_including_gravity() else {
                return;
            };
            let sample = MotionSample {
                x: acceleration.x().map(|v| v as f32),
                y: acceleration.y().map(|v| v as f32),
                z: acceleration.z().map(|v| v as f32),
            };
            app.borrow_mut().dispatch(InputEvent::Motion(sample));
        });
        let _ = window.add_event_listener_with_callback("devicemotion", closure.as_ref().unchecked_ref());
        closure.forget();
    }

    fn setup_motion_permission(document: &Document, app: Rc<RefCell<App>>) {
        if !motion_supported() {
            app.borrow_mut().session.set_motion_permission(false);
            return;
        }
        if !motion_needs_permission() {
            app.borrow_mut().session.set_motion_permission(true);
            return;
        }

        let Some(button) = document
            .get_element_by_id("authButton")
            .and_then(|e| e.dyn_into::<HtmlElement>().ok())
        else {
            log::warn!("No #authButton; motion input stays locked");
            return;
        };
        let _ = button.style().set_property("display", "block");

        let target = button.clone();
        let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::MouseEvent| {
            let app = app.clone();
            let target = target.clone();
            spawn_local(async move {
                let granted = JsFuture::from(request_motion_permission())
                    .await
                    .ok()
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                app.borrow_mut().session.set_motion_permission(granted);
                if granted {
                    let _ = target.style().set_property("display", "none");
                }
            });
        });
        let _ = button.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref());
        closure.forget();
    }

    fn setup_resize(window: &Window, container: HtmlElement, app: Rc<RefCell<App>>) {
        let closure = Closure::<dyn FnMut(_)>::new(move |_event: Event| {
            let (w, h) = (container.client_width(), container.client_height());
            app.borrow_mut().session.resize(w as f32, h as f32);
        });
        let _ = window.add_event_listener_with_callback("resize", closure.as_ref().unchecked_ref());
        closure.forget();
    }

    pub fn run() {
        console_error_panic_hook::set_once();
        if console_log::init_with_level(log::Level::Info).is_err() {
            web_sys::console::warn_1(&"logger already initialized".into());
        }

        log::info!("Press Here starting...");

        let Some(window) = web_sys::window() else { return };
        let Some(document) = window.document() else { return };
        let Some(container) = document
            .get_element_by_id("buttonsContainer")
            .and_then(|e| e.dyn_into::<HtmlElement>().ok())
        else {
            log::error!("No #buttonsContainer element");
            return;
        };

        let mut settings = Settings::load();
        let query = window.location().search().unwrap_or_default();
        if settings.apply_query(&query) {
            settings.save();
        }
        let bounds = ContainerBounds::new(container.client_width() as f32, container.client_height() as f32);
        let mut page = Page {
            surface: DomSurface::new(document.clone(), container.clone(), &settings),
            audio: None,
        };
        let seed = js_sys::Date::now() as u64;
        let session = Session::new(bounds, &settings, seed, &mut page);

        let app = Rc::new(RefCell::new(App {
            session,
            page,
            settings,
            audio: AudioState::Idle,
            nudged: false,
        }));

        setup_marker_handlers(&container, app.clone());
        setup_motion(&window, app.clone());
        setup_motion_permission(&document, app.clone());
        setup_resize(&window, container, app);
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn wasm_main() {
    web::run();
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    use press_here::surface::LogSurface;
    use press_here::{ContainerBounds, PhysicsBackend, Session, Settings};

    env_logger::init();

    let backend = std::env::args()
        .nth(1)
        .and_then(|arg| PhysicsBackend::from_str(&arg))
        .unwrap_or_default();
    log::info!("Press Here (native) starting with {} physics", backend.as_str());
    log::info!("The book itself runs in the browser - replaying a scripted session");

    let settings = Settings { physics: backend, ..Settings::load() };
    let mut surface = LogSurface::default();
    let mut session = Session::new(ContainerBounds::default(), &settings, 7, &mut surface);
    session.set_motion_permission(true);

    for _ in 0..MAX_SCRIPTED_EVENTS {
        if session.state.completed {
            break;
        }
        let Some(event) = next_scripted_event(&session) else { break };
        session.handle(event, &mut surface);
    }

    match session.snapshot_json() {
        Ok(json) => println!("{}", json),
        Err(e) => log::error!("Could not serialize session: {}", e),
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}

#[cfg(not(target_arch = "wasm32"))]
const MAX_SCRIPTED_EVENTS: usize = 200;

/// What a reader would do next at the session's current step
#[cfg(not(target_arch = "wasm32"))]
fn next_scripted_event(session: &press_here::Session) -> Option<press_here::InputEvent> {
    use press_here::InputEvent;
    use press_here::sim::{Binding, MarkerColor, MotionSample};

    let first = |color| session.registry.query_by_color(color).first().copied();
    let shake = |magnitude| InputEvent::Motion(MotionSample::new(0.0, 0.0, magnitude));

    let event = match session.step() {
        1 | 2 | 5 => InputEvent::Click(session.reference()?),
        // Yellows are [reference, side, ...]: left at 3, right at 4
        3 | 4 => InputEvent::Touch(*session.registry.query_by_color(MarkerColor::Yellow).get(1)?),
        6 => InputEvent::Click(first(MarkerColor::Red)?),
        7 => InputEvent::Click(first(MarkerColor::Blue)?),
        8 | 12 => shake(25.0),
        9 => shake(35.0),
        10 => InputEvent::Motion(MotionSample::tilt(-5.0)),
        11 => InputEvent::Motion(MotionSample::tilt(5.0)),
        14 => InputEvent::Click(*session.registry.bound_to(Binding::GridCoverage).first()?),
        _ => return None,
    };
    Some(event)
}
