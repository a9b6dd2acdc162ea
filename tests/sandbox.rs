use pyarcade::config::Config;
use pyarcade::console::{BufferConsole, LineStyle, NotificationKind, RecordingNotifier};
use pyarcade::grammar::Value;
use pyarcade::project::{DirectoryStore, MemoryStore};
use pyarcade::runtime::HostRuntime;
use pyarcade::runtime::input::InputScript;
use pyarcade::runtime::scheduler::ManualClock;
use pyarcade::runtime::surface::{Color, DrawCommand, HeadlessSurface};
use pyarcade::sandbox::{RunError, Sandbox};
use pyarcade::FaultKind;
use std::path::Path;

struct Harness {
    sandbox: Sandbox,
    console: BufferConsole,
    notifier: RecordingNotifier,
    clock: ManualClock,
}

fn harness_with(config: Config) -> Harness {
    let clock = ManualClock::new();
    let runtime = HostRuntime::new(
        Box::new(HeadlessSurface::new()),
        Box::new(clock.clone()),
        config.runtime.clone(),
    );
    let console = BufferConsole::new();
    let notifier = RecordingNotifier::new();
    let sandbox = Sandbox::with_runtime(&config, runtime)
        .with_console(console.clone())
        .with_notifier(notifier.clone());
    Harness {
        sandbox,
        console,
        notifier,
        clock,
    }
}

fn harness() -> Harness {
    let mut config = Config::default();
    config.random.seed = Some(42);
    harness_with(config)
}

fn run_lines(source: &str) -> Vec<String> {
    let mut h = harness();
    h.sandbox.run(source).expect("run");
    h.sandbox.output().to_vec()
}

#[test]
fn range_with_one_argument_counts_from_zero() {
    let out = run_lines("for i in range(5):\n    print(i)\n");
    assert_eq!(out, ["0", "1", "2", "3", "4"]);
}

#[test]
fn range_with_start_and_step() {
    assert_eq!(run_lines("for i in range(2, 5):\n    print(i)\n"), ["2", "3", "4"]);
    assert_eq!(
        run_lines("for i in range(0, 10, 2):\n    print(i)\n"),
        ["0", "2", "4", "6", "8"]
    );
    assert_eq!(
        run_lines("for i in range(3, 0, -1):\n    print(i)\n"),
        ["3", "2", "1"]
    );
}

#[test]
fn rebinding_updates_the_single_binding() {
    let out = run_lines("x = 5\nx = x + 1\nprint(x)\n");
    assert_eq!(out, ["6"]);
}

#[test]
fn fstring_interpolates_bound_values() {
    let out = run_lines("score = 30\nprint(f\"Score: {score}\")\n");
    assert_eq!(out, ["Score: 30"]);
}

#[test]
fn print_renders_containers_as_json() {
    let out = run_lines("snake = {'x': 1, 'body': [(1, 2)], 'alive': True}\nprint(snake, None)\n");
    assert_eq!(out, [r#"{"x":1,"body":[[1,2]],"alive":true} null"#]);
}

#[test]
fn functions_loops_and_conditions() {
    let source = "\
def classify(n):
    if n % 2 == 0:
        return 'even'
    elif n == 3:
        return 'three'
    else:
        return 'odd'

words = []
for n in range(4):
    words.append(classify(n))
print(', '.join(words))

total = 0
while True:
    total += 1
    if total >= 3:
        break
print(total, len(words))
";
    assert_eq!(run_lines(source), ["even, odd, even, three", "3 4"]);
}

#[test]
fn globals_are_shared_with_functions() {
    let source = "\
score = 0
def add(points):
    global score
    score += points
add(5)
add(7)
print(score)
";
    assert_eq!(run_lines(source), ["12"]);
}

#[test]
fn runtime_fault_appends_one_error_line_and_stops() {
    let mut h = harness();
    let fault = h
        .sandbox
        .run("print('before')\nprint(missing)\nprint('after')\n")
        .unwrap_err();

    assert!(matches!(
        fault,
        pyarcade::Fault::Runtime {
            kind: FaultKind::ReferenceError,
            line: Some(2),
            ..
        }
    ));
    assert_eq!(
        h.sandbox.output(),
        [
            "before".to_string(),
            "❌ Error: ReferenceError: missing is not defined (line 2)".to_string()
        ]
    );
    assert_eq!(h.console.styled(LineStyle::Error).len(), 1);
    assert_eq!(h.console.styled(LineStyle::Log), ["before"]);
    assert_eq!(h.notifier.history()[0].0, NotificationKind::Error);
}

#[test]
fn translation_artifacts_surface_as_syntax_faults() {
    let mut h = harness();
    let fault = h.sandbox.run("x = (1,\n").unwrap_err();
    assert!(fault.is_syntax());
    assert_eq!(h.console.styled(LineStyle::Error).len(), 1);
}

#[test]
fn events_drain_and_keys_snapshot() {
    let mut h = harness();
    let script = InputScript::from_text("@0 keydown ArrowUp\n").expect("script");
    h.sandbox.runtime_mut().set_input_script(script);

    let source = "\
game.init(100, 100, 'input')
first = game.events()
second = game.events()
print(len(first), len(second))
print(first[0].type, first[0].key)
a = game.get_keys()
b = game.get_keys()
print(a['up'], a['down'], a == b)
";
    h.sandbox.run(source).expect("run");
    assert_eq!(
        h.sandbox.output(),
        ["1 0", "keydown arrowup", "true false true"]
    );
}

#[test]
fn drawing_before_init_is_a_fault() {
    let mut h = harness();
    let fault = h.sandbox.run("game.rect(0, 0, 10, 10, (255, 0, 0))\n").unwrap_err();
    assert_eq!(
        fault.to_string(),
        "Error: Cannot draw before game.init() is called (line 1)"
    );
}

#[test]
fn update_presents_the_frame() {
    let mut h = harness();
    let source = "\
game.init(320, 240, 'frame')
game.clear((0, 0, 0))
game.rect(1, 2, 3, 4, 'red')
game.text('hi', 5, 6)
game.update(30)
";
    h.sandbox.run(source).expect("run");
    let rt = h.sandbox.runtime();
    assert!(rt.is_initialized());
    assert_eq!(rt.frames(), 1);
    assert_eq!(
        rt.last_frame(),
        [
            DrawCommand::Clear(Color::Rgb(0, 0, 0)),
            DrawCommand::Rect {
                x: 1.0,
                y: 2.0,
                width: 3.0,
                height: 4.0,
                color: Color::Token("red".into()),
            },
            DrawCommand::Text {
                text: "hi".into(),
                x: 5.0,
                y: 6.0,
                color: Color::WHITE,
                size: 16.0,
                center: false,
            },
        ]
    );
}

#[test]
fn frame_budget_ends_a_guest_loop() {
    let mut config = Config::default();
    config.runtime.max_frames = Some(5);
    let mut h = harness_with(config);
    let source = "\
game.init(100, 100, 'loop')
frames = 0
while game.running:
    frames += 1
    game.update(60)
print(frames)
";
    h.sandbox.run(source).expect("run");
    assert_eq!(h.sandbox.output(), ["5"]);
}

const CALLBACK_PROGRAM: &str = "\
count = 0
def frame(dt):
    global count
    count += 1
    if count == 3:
        game.stop()
game.init(10, 10, 'tick')
game.start(frame, 10)
";

#[test]
fn scheduler_invokes_the_callback_once_per_interval() {
    let mut h = harness();
    h.sandbox.run(CALLBACK_PROGRAM).expect("run");
    assert!(h.sandbox.expects_frame_loop());

    // not due yet
    h.clock.advance_ms(50.0);
    assert_eq!(h.sandbox.tick(), Ok(false));

    h.clock.advance_ms(50.0);
    assert_eq!(h.sandbox.tick(), Ok(true));

    while h.sandbox.expects_frame_loop() {
        h.sandbox.wait_for_frame();
        h.sandbox.tick().expect("tick");
    }
    assert_eq!(h.sandbox.global("count"), Some(&Value::Number(3.0)));
    assert_eq!(h.sandbox.runtime().frames(), 3);
    assert!(h
        .notifier
        .history()
        .iter()
        .any(|(kind, msg)| *kind == NotificationKind::Info && msg == "Game stopped"));
}

#[test]
fn paused_loop_skips_callbacks() {
    let mut config = Config::default();
    config.runtime.max_frames = Some(1);
    let mut h = harness_with(config);
    h.sandbox.run(CALLBACK_PROGRAM).expect("run");
    h.sandbox.runtime_mut().pause();
    for _ in 0..3 {
        h.clock.advance_ms(100.0);
        assert_eq!(h.sandbox.tick(), Ok(false));
    }
    assert_eq!(h.sandbox.global("count"), Some(&Value::Number(0.0)));
    assert_eq!(h.sandbox.runtime().frames(), 0);
    assert!(h.sandbox.expects_frame_loop());

    h.sandbox.runtime_mut().pause();
    h.clock.advance_ms(100.0);
    assert_eq!(h.sandbox.tick(), Ok(true));
    assert_eq!(h.sandbox.runtime().frames(), 1);
    assert!(!h.sandbox.expects_frame_loop());
}

#[test]
fn new_run_stops_the_previous_loop() {
    let mut h = harness();
    h.sandbox.run(CALLBACK_PROGRAM).expect("run");
    assert!(h.sandbox.expects_frame_loop());

    h.sandbox.run("print('second')\n").expect("run");
    assert!(!h.sandbox.expects_frame_loop());

    h.clock.advance_ms(1000.0);
    assert_eq!(h.sandbox.tick(), Ok(false));
    assert_eq!(h.sandbox.output(), ["second"]);
}

#[test]
fn callback_fault_stops_the_loop_and_is_reported() {
    let mut h = harness();
    let source = "\
def frame(dt):
    print(undefined_thing)
game.init(10, 10, 'bad')
game.start(frame, 10)
";
    h.sandbox.run(source).expect("run");
    h.clock.advance_ms(100.0);
    let fault = h.sandbox.tick().unwrap_err();
    assert!(fault.to_string().contains("undefined_thing is not defined"));
    assert!(!h.sandbox.expects_frame_loop());
    assert_eq!(h.console.styled(LineStyle::Error).len(), 1);
}

#[test]
fn seeded_randomness_is_reproducible() {
    let program = "\
import random
rolls = []
for i in range(5):
    rolls.append(random.randint(1, 6))
print(rolls)
print(random.choice(['a', 'b', 'c']))
";
    let first = run_lines(program);
    let second = run_lines(program);
    assert_eq!(first, second);
    assert!(first[0].starts_with('['));
}

#[test]
fn project_files_run_from_a_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("main.py"), "print('from disk')\n").expect("write");
    let store = DirectoryStore::new(dir.path());

    let mut h = harness();
    let out = h.sandbox.run_project(&store, "main").expect("run");
    assert_eq!(out, "from disk");
    assert!(matches!(
        h.sandbox.run_project(&store, "absent"),
        Err(RunError::Store(_))
    ));
}

#[test]
fn project_files_run_from_memory() {
    let mut store = MemoryStore::new();
    store.insert("main.py", "print(1 + 2)");
    let mut h = harness();
    assert_eq!(h.sandbox.run_project(&store, "main").expect("run"), "3");
}

#[test]
fn bundled_snake_plays_until_it_hits_the_wall() {
    let store = DirectoryStore::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("project"));
    let mut h = harness();
    h.sandbox.run_project(&store, "snake").expect("run");
    assert_eq!(
        h.sandbox.output(),
        ["Game Over! Score: 0", "Thanks for playing!"]
    );
    assert_eq!(h.sandbox.runtime().frames(), 19);
    assert!(!h.sandbox.runtime().is_running());
}

#[test]
fn bundled_shooter_runs_on_the_scheduler() {
    let mut config = Config::default();
    config.random.seed = Some(3);
    config.runtime.max_frames = Some(90);
    let mut h = harness_with(config);
    let store = DirectoryStore::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("project"));

    h.sandbox.run_project(&store, "shooter").expect("run");
    assert_eq!(h.sandbox.output(), ["Shooter started"]);

    while h.sandbox.expects_frame_loop() {
        h.sandbox.wait_for_frame();
        h.sandbox.tick().expect("tick");
    }
    assert!(h.sandbox.runtime().frames() <= 90);
}

#[test]
fn self_containing_lists_fault_instead_of_crashing() {
    let mut h = harness();
    let source = "\
x = [2, 1]
x.append(x)
x.sort()
print(x[0], x[1], len(x))
print(String(x))
y = [1, 2]
y.append(y)
print(x == y)
print(x)
";
    let fault = h.sandbox.run(source).unwrap_err();
    assert!(matches!(
        fault,
        pyarcade::Fault::Runtime {
            kind: FaultKind::TypeError,
            line: Some(9),
            ..
        }
    ));
    assert_eq!(
        h.sandbox.output(),
        [
            "1 2 3",
            "1,2,",
            "true",
            "❌ Error: TypeError: Converting circular structure to JSON (line 9)",
        ]
    );
}

#[test]
fn exponent_operator_and_literals() {
    let source = "\
x = 3
x **= 2
print(2 ** 3, 2 ** 3 ** 2, -2 ** 2, 2 ** -1, x)
print(1e3, 2.5e-1 * 4)
";
    assert_eq!(run_lines(source), ["8 512 -4 0.5 9", "1000 1"]);
}

#[test]
fn pointer_and_raw_keys_are_readable() {
    let mut h = harness();
    let script =
        InputScript::from_text("@0 mousemove 12 34\n@0 mousedown\n@0 keydown a KeyA\n")
            .expect("script");
    h.sandbox.runtime_mut().set_input_script(script);

    let source = "\
game.init(100, 100, 'pointer')
print(game.mouse)
print(game.keys['a'], game.keys['keya'], game.keys['b'])
";
    h.sandbox.run(source).expect("run");
    assert_eq!(
        h.sandbox.output(),
        [r#"{"x":12,"y":34,"pressed":true}"#, "true true null"]
    );
}
