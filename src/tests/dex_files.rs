use crate::config::Config;
use crate::dex::class_manager::{INVALID_METHOD, INVALID_TYPE};
use crate::dex::{DexFile, ErrorKind};
use crate::tests::builder::*;
use crate::tests::{sample_app, INNER, MAIN};

fn load() -> DexFile {
    DexFile::load(&sample_app().build()).unwrap()
}

#[test]
fn classes_and_members()
{
    let dex = load();
    assert_eq!(dex.get_classes_names(), &[MAIN.to_string(), INNER.to_string()]);

    let main = dex.get_class(MAIN).unwrap();
    assert_eq!(main.get_superclass_name().as_deref(), Some("Ljava/lang/Object;"));
    assert_eq!(main.get_interfaces(), vec!["Ljava/lang/Runnable;".to_string()]);
    assert_eq!(main.get_source().as_deref(), Some("Main.java"));
    assert_eq!(main.get_access_flags_string(), "public");

    let names: Vec<String> = main.get_methods().iter().map(|m| m.get_name()).collect();
    assert_eq!(names, vec!["<init>", "helper", "nativeStuff", "run"]);

    let native = main.get_methods().into_iter().find(|m| m.get_name() == "nativeStuff").unwrap();
    assert_eq!(native.get_descriptor(), "(I J)V");
    assert_eq!(native.full_name(), "LMain; nativeStuff (I J)V");
    assert_eq!(native.get_access_flags_string(), "public native");
    assert!(native.get_code().is_none());
    assert_eq!(native.get_length(), 0);

    let fields: Vec<(String, String, String)> = main
        .get_fields()
        .iter()
        .map(|f| (f.get_name(), f.get_descriptor(), f.get_access_flags_string()))
        .collect();
    assert_eq!(
        fields,
        vec![
            ("count".to_string(), "I".to_string(), "static".to_string()),
            ("name".to_string(), "Ljava/lang/String;".to_string(), "private".to_string()),
        ]
    );
}

#[test]
fn run_instructions()
{
    let dex = load();
    let run = dex.get_method_descriptor(MAIN, "run", "()V").unwrap();
    assert_eq!(run.get_length(), 26);
    let offsets: Vec<usize> = run.get_instructions_idx().iter().map(|(o, _)| *o).collect();
    assert_eq!(offsets, vec![0, 4, 8, 14, 20, 24, 28, 34, 40, 46, 50]);

    let cm = dex.get_class_manager();
    let text: Vec<String> = run.get_instructions().iter().map(|i| i.show_buff(cm)).collect();
    assert_eq!(text[0], "const-string v0, \"hello\"");
    assert_eq!(text[1], "new-instance v1, Lcom/ext/Helper;");
    assert_eq!(text[3], "invoke-virtual v1, v0, Lcom/ext/Helper;->greet(Ljava/lang/String;)V");
    assert_eq!(text[4], "sget v0, LMain;->count I");
    assert_eq!(text[10], "return-void");
}

#[test]
fn bad_indexes_resolve_to_placeholders()
{
    let dex = load();
    let cm = dex.get_class_manager();
    assert_eq!(cm.get_type(9999), INVALID_TYPE);
    assert_eq!(cm.get_type(9999), "AG:ITI: invalid type");
    assert_eq!(cm.get_method(9999).0, INVALID_METHOD);
    assert!(dex.get_method_by_idx(9999).is_none());
}

#[test]
fn save_reloads_to_the_same_file()
{
    let dex = load();
    let saved = dex.save().unwrap();
    assert_eq!(saved, sample_app().build());
    let again = DexFile::load(&saved).unwrap();

    assert_eq!(again.get_classes_names(), dex.get_classes_names());
    assert_eq!(again.get_strings(), dex.get_strings());
    let (before, after) = (dex.get_methods(), again.get_methods());
    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(after.iter()) {
        assert_eq!(a.get_triple(), b.get_triple());
        assert_eq!(a.get_code().map(|c| c.insns.clone()), b.get_code().map(|c| c.insns.clone()));
    }
    assert_eq!(again.save().unwrap(), saved);
}

#[test]
fn methods_by_index_and_cached_code()
{
    let dex = load();
    for m in dex.get_methods() {
        let found = dex.get_method_by_idx(m.get_method_idx()).unwrap();
        assert_eq!(found, m);
    }
    let run = dex.get_method_descriptor(MAIN, "run", "()V").unwrap();
    assert_eq!(run.get_nb_instructions(), 11);
    // decoded once, the same slice afterwards
    assert!(std::ptr::eq(run.instructions(), dex.get_method_by_idx(run.get_method_idx()).unwrap().instructions()));
    assert_eq!(run.get_instructions_idx().len(), 11);
}

#[test]
fn checksum_is_verified()
{
    let mut bytes = sample_app().build();
    let pos = bytes.windows(6).position(|w| w == b"unused").unwrap();
    bytes[pos] = b'x';

    let e = DexFile::load(&bytes).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::InvalidFormat);

    let lenient = Config::default().with_verify_checksum(false);
    let dex = DexFile::load_with_config(&bytes, &lenient).unwrap();
    assert!(dex.get_strings().iter().any(|s| s == "xnused"));
}

#[test]
fn renames_are_not_saved()
{
    let mut dex = load();
    let go = dex.get_method_descriptor(INNER, "go", "()V").unwrap().get_method_idx();
    dex.set_method_name(go, "start").unwrap();
    dex.set_class_name(INNER, "LRenamed;").unwrap();

    assert!(dex.get_method_descriptor("LRenamed;", "start", "()V").is_some());
    assert!(dex.get_class(INNER).is_none());
    assert_eq!(dex.set_class_name("LNope;", "LX;").unwrap_err().kind(), ErrorKind::InvalidArgument);

    let reloaded = DexFile::load(&dex.save().unwrap()).unwrap();
    assert!(reloaded.get_class(INNER).is_some());
    assert!(reloaded.get_method_descriptor(INNER, "go", "()V").is_some());
}

#[test]
fn odd_code_is_padded_before_tries()
{
    // const/4 v0, #0; throw v0; return-void
    let code = Code::new(1, raw(&[0x0012, 0x0027, 0x000e])).with_try(Try {
        start: 0,
        count: 2,
        handlers: vec![("Ljava/lang/Exception;".to_string(), 2)],
        catch_all: None,
    });
    let bytes = DexBuilder::new()
        .class(ClassSpec::new("LT;").method("f", "()V", ACC_STATIC, Some(code)))
        .build();
    let dex = DexFile::load(&bytes).unwrap();
    assert_eq!(dex.save().unwrap(), bytes);
    let f = dex.get_method_descriptor("LT;", "f", "()V").unwrap();
    let code = f.get_code().unwrap();
    assert_eq!(code.insns_size(), 3);
    assert_eq!(code.padding, 0);
    assert_eq!(code.tries.len(), 1);
    let handler = code.handler_for(&code.tries[0]).unwrap();
    assert_eq!(handler.handlers[0].addr, 2);
    assert_eq!(handler.catch_all_addr, None);

    let again = DexFile::load(&dex.save().unwrap()).unwrap();
    let code2 = again.get_method_descriptor("LT;", "f", "()V").unwrap().get_code().unwrap().clone();
    assert_eq!(&code2, code);
}

#[test]
fn api_level_follows_magic()
{
    for (magic, api) in [(b"dex\n035\0", 1), (b"dex\n037\0", 24), (b"dex\n038\0", 26), (b"dex\n039\0", 28)] {
        let dex = DexFile::load(&DexBuilder::new().magic(magic).class(ClassSpec::new("LA;")).build()).unwrap();
        assert_eq!(dex.get_api_level(), api);
        assert!(!dex.is_odex());
    }
}
