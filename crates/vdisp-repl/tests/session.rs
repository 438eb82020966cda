//! Driving a session over a loaded hierarchy.

use vdisp_front::Program;
use vdisp_repl::{Output, ReplSession};

const PETS: &str = r#"
[[class]]
name = "Animal"
fields = ["name"]

  [[class.method]]
  signature = "speak()"
  body = '"..."'

  [[class.method]]
  signature = "intro()"
  body = 'self.name + " says " + self.speak()'

[[class]]
name = "Dog"
extends = "Animal"
fields = ["tricks"]

  [[class.method]]
  signature = "speak()"
  body = '"woof"'
  override = true

  [[class.method]]
  signature = "learn(n: Int)"
  body = "self.tricks + n"

[[object]]
name = "rex"
class = "Dog"
fields = { name = "Rex", tricks = 2 }
"#;

fn session() -> ReplSession {
    ReplSession::new(Program::load(PETS).unwrap())
}

fn print(session: &mut ReplSession, line: &str) -> String {
    match session.execute(line) {
        Ok(Output::Print(text)) => text,
        other => panic!("`{line}` gave {other:?}"),
    }
}

#[test]
fn test_calls_on_file_objects() {
    let mut s = session();
    assert_eq!(print(&mut s, "rex.intro()"), "\"Rex says woof\"");
    assert_eq!(print(&mut s, "rex as Animal.speak()"), "\"woof\"");
    assert_eq!(print(&mut s, "rex.learn(1 + 2)"), "5");
}

#[test]
fn test_let_binds_new_objects() {
    let mut s = session();
    assert_eq!(print(&mut s, "let a = new Animal(name: \"Cat\")"), "a: Animal");
    assert_eq!(print(&mut s, "a.intro()"), "\"Cat says ...\"");

    // rebinding replaces the object
    assert_eq!(print(&mut s, "let a = new Dog(name: \"Pup\", tricks: 0)"), "a: Dog");
    assert_eq!(print(&mut s, "a.intro()"), "\"Pup says woof\"");
    assert_eq!(print(&mut s, "vars"), "rex: Dog\na: Dog");

    let err = s.execute("let b = new Animal(age: 3)").unwrap_err();
    assert_eq!(err, "class `Animal` has no field `age`");
    let err = s.execute("let b = new Ghost").unwrap_err();
    assert_eq!(err, "unknown class `Ghost`");
}

#[test]
fn test_tables_and_slots() {
    let mut s = session();
    insta::assert_snapshot!(print(&mut s, "table Dog"), @r"
    Dog extends Animal (3 slots)
      #0 speak() -> Dog.speak [override]
      #1 intro() -> Animal.intro [inherited from Animal]
      #2 learn(Int) -> Dog.learn [new]
    ");
    assert_eq!(print(&mut s, "slot Dog learn(Int)"), "Dog.learn(Int) is slot #2");
    assert_eq!(print(&mut s, "slot Animal intro()"), "Animal.intro() is slot #1");
    assert!(s.execute("slot Animal learn(Int)").is_err());
    assert_eq!(
        print(&mut s, "classes"),
        "Animal (2 slots) fields: name\nDog extends Animal (3 slots) fields: name, tricks"
    );
    assert!(print(&mut s, "tables").starts_with("Animal (2 slots)"));
}

#[test]
fn test_errors_do_not_end_the_session() {
    let mut s = session();
    assert!(s.execute("nobody.speak()").is_err());
    assert!(s.execute("rex as Ghost.speak()").is_err());
    assert!(s.execute("rex.fly()").is_err());
    assert_eq!(print(&mut s, "rex.speak()"), "\"woof\"");
}
