use sandbox::ENTRY_FUNCTION;

const LANGUAGE_SUBSET: &str = "\
The code runs in a restricted Python 3 interpreter. Stay inside this subset:
- def functions with positional parameters and default values; keyword arguments at call sites; nested helper functions
- assignment, tuple unpacking, augmented assignment (+=, -=, ...)
- if/elif/else, for/else, while/else, break, continue, try/except/else, raise
- f-strings with format specs such as {value:.1f}, str.format, and % formatting
- lists, tuples, dicts, list and dict comprehensions, slicing with steps such as [::-1]
- builtins: str int float bool len round abs min max sum range list tuple dict sorted enumerate zip any all isinstance repr type print
- str methods: lower upper strip lstrip rstrip split join replace startswith endswith find count title capitalize format isdigit
- list methods: append extend pop index insert; dict methods: get keys values items
Not available: classes, lambda, with, yield/generators, global/nonlocal, async, del, assert, finally, decorators, and every module other than typing.";

/// Build the system prompt that asks the model for an entry function.
pub fn build_system_prompt(interface: &str) -> String {
    format!(
        "\
Your job is to write a Python function that answers the user's question. You have the following functions you can call to help provide context, and then you can make one final call to an LLM to produce an answer, given the context. Alternatively, you can just return an answer directly. If an answer cannot be obtained, also return that information directly, along with an explanation. Your response should have the following signature:
def {ENTRY_FUNCTION}(question: str) -> str

You have the following functions at your disposal:

{interface}

{LANGUAGE_SUBSET}

Important: only respond in valid Python, with the {ENTRY_FUNCTION} function implementation. Put any comments or reasoning you may have in the function's return value. Do not import any libraries; only `typing` may be imported, and the functions above need no import.
"
    )
}
