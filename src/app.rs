use crate::error::Result;
use crate::executor::Executor;
use crate::plugin::Plugin;
use crate::schedule::Schedule;
use crate::system::BoxedSystem;
use crate::world::World;

/// A function copying whatever the render sub-app needs out of the main
/// world, run once per frame between the main and render updates.
type ExtractFn = Box<dyn FnMut(&mut World, &mut World) + Send>;

/// A secondary application with its own world and schedule, run after the
/// main app each frame. `App` keeps exactly one of these for rendering:
/// the main world drives gameplay, the render world holds only what
/// `extract` copies into it, so render work never races a gameplay system
/// mutating the same data mid-frame.
pub struct SubApp {
    pub world: World,
    executor: Executor,
    extract: Option<ExtractFn>,
}

impl SubApp {
    pub fn new() -> Self {
        Self { world: World::new(), executor: Executor::new(Schedule::new()), extract: None }
    }

    /// Add a system to this sub-app's own schedule.
    pub fn add_system(&mut self, system: BoxedSystem) -> &mut Self {
        self.executor.schedule.add_system(system);
        self
    }

    pub fn schedule_mut(&mut self) -> &mut Schedule {
        &mut self.executor.schedule
    }

    /// Set the function that copies data from the main world into this
    /// sub-app's world. Replaces any previously set extract function.
    pub fn set_extract<F>(&mut self, extract: F)
    where
        F: FnMut(&mut World, &mut World) + Send + 'static,
    {
        self.extract = Some(Box::new(extract));
    }

    /// Run the extract function (if one is set) against `main_world`.
    pub fn extract(&mut self, main_world: &mut World) {
        if let Some(extract) = &mut self.extract {
            extract(main_world, &mut self.world);
        }
    }

    /// Run one frame of this sub-app's own schedule.
    pub fn update(&mut self) -> Result<()> {
        self.executor.execute_frame(&mut self.world)
    }
}

impl Default for SubApp {
    fn default() -> Self {
        Self::new()
    }
}

/// Main application entry point: a world, a schedule of systems that act on
/// it, the executor that dispatches them each frame, and a render sub-app
/// that runs after an extract phase copies data out of the main world.
pub struct App {
    pub world: World,
    executor: Executor,
    render_app: SubApp,
}

impl App {
    /// Create new application
    pub fn new() -> Self {
        Self { world: World::new(), executor: Executor::new(Schedule::new()), render_app: SubApp::new() }
    }

    /// Add a plugin
    pub fn add_plugin<P: Plugin>(&mut self, plugin: P) -> &mut Self {
        println!("Registering plugin: {}", std::any::type_name::<P>());
        plugin.build(self);
        self
    }

    /// Add a system to the main world's schedule
    pub fn add_system(&mut self, system: BoxedSystem) -> &mut Self {
        self.executor.schedule.add_system(system);
        self
    }

    pub fn schedule_mut(&mut self) -> &mut Schedule {
        &mut self.executor.schedule
    }

    /// Access the render sub-app, to add its systems or set its extract
    /// function.
    pub fn render_app_mut(&mut self) -> &mut SubApp {
        &mut self.render_app
    }

    /// Set the extract function run between the main and render updates.
    pub fn set_extract<F>(&mut self, extract: F) -> &mut Self
    where
        F: FnMut(&mut World, &mut World) + Send + 'static,
    {
        self.render_app.set_extract(extract);
        self
    }

    /// Run one frame: the main world's schedule, then extract into the
    /// render world, then the render world's own schedule.
    pub fn update(&mut self) -> Result<()> {
        self.executor.execute_frame(&mut self.world)?;
        self.render_app.extract(&mut self.world);
        self.render_app.update()
    }

    /// Run the application loop at a fixed 60Hz cadence until a system
    /// returns an error.
    pub fn run(&mut self) -> Result<()> {
        loop {
            self.update()?;
            std::thread::sleep(std::time::Duration::from_millis(16));
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{IntoSystem, Res, ResMut};

    struct TestPlugin;
    impl Plugin for TestPlugin {
        fn build(&self, _app: &mut App) {}
    }

    #[test]
    fn test_app_creation() {
        let mut app = App::new();
        app.add_plugin(TestPlugin);
        app.update().unwrap();
    }

    struct Score(u32);
    struct RenderedScore(u32);

    fn read_score(score: Res<Score>, mut rendered: ResMut<RenderedScore>) {
        rendered.0 = score.0;
    }

    #[test]
    fn extract_copies_main_world_state_into_the_render_world_each_frame() {
        let mut app = App::new();
        app.world.insert_resource(Score(0));
        app.render_app_mut().world.insert_resource(Score(0));
        app.render_app_mut().world.insert_resource(RenderedScore(0));
        app.render_app_mut().add_system(Box::new(IntoSystem::<(Res<Score>, ResMut<RenderedScore>)>::into_system(read_score, "read_score")));
        app.set_extract(|main_world, render_world| {
            let score = main_world.resource::<Score>().unwrap().0;
            render_world.resource_mut::<Score>().unwrap().0 = score;
        });

        app.world.resource_mut::<Score>().unwrap().0 = 7;
        app.update().unwrap();

        assert_eq!(app.render_app_mut().world.resource::<RenderedScore>().unwrap().0, 7);
    }
}
